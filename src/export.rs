//! Export pipeline.
//!
//! Collects exporters, narrows them to the requested step types, checks that
//! the actor may run every one of them and concatenates their output into a
//! schema. Any failure aborts the whole export; a partial schema is never
//! returned.

use tracing::{debug, warn};

use crate::config::BlueprintConfig;
use crate::error::{BlueprintError, Result};
use crate::exporters::{StepExporter, builtin_exporters};
use crate::host::Host;
use crate::logger::BlueprintLogger;
use crate::step::{BlueprintSchema, is_valid_step_type, validate_landing_page};

type LandingPageResolver = Box<dyn Fn(&str) -> String + Send>;
type ExporterFilter = Box<dyn FnMut(Vec<Box<dyn StepExporter>>) -> Vec<Box<dyn StepExporter>> + Send>;
type BeforeExportHook = Box<dyn FnMut(&mut dyn StepExporter) -> anyhow::Result<()> + Send>;

pub struct ExportPipeline {
    host: Host,
    logger: BlueprintLogger,
    landing_page: String,
    exported_options: Vec<String>,
    exporters: Vec<Box<dyn StepExporter>>,
    landing_page_resolver: Option<LandingPageResolver>,
    filters: Vec<ExporterFilter>,
    before_export: Vec<BeforeExportHook>,
}

impl ExportPipeline {
    pub fn new(host: Host, config: &BlueprintConfig) -> Self {
        Self {
            host,
            logger: BlueprintLogger::default(),
            landing_page: config.landing_page.clone(),
            exported_options: config.exported_options.clone(),
            exporters: Vec::new(),
            landing_page_resolver: None,
            filters: Vec::new(),
            before_export: Vec::new(),
        }
    }

    pub fn with_logger(mut self, logger: BlueprintLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Add an externally supplied exporter. External exporters run before the
    /// built-in ones, in registration order.
    pub fn with_exporter(mut self, exporter: Box<dyn StepExporter>) -> Self {
        self.exporters.push(exporter);
        self
    }

    pub fn with_exporters(mut self, exporters: impl IntoIterator<Item = Box<dyn StepExporter>>) -> Self {
        self.exporters.extend(exporters);
        self
    }

    /// Override the landing page. The resolver receives the configured value.
    pub fn resolve_landing_page_with<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&str) -> String + Send + 'static,
    {
        self.landing_page_resolver = Some(Box::new(resolver));
        self
    }

    /// Filter, reorder or extend the candidate exporter list.
    pub fn on_filter_exporters<F>(mut self, filter: F) -> Self
    where
        F: FnMut(Vec<Box<dyn StepExporter>>) -> Vec<Box<dyn StepExporter>> + Send + 'static,
    {
        self.filters.push(Box::new(filter));
        self
    }

    /// Called for each exporter right before it runs. An error aborts the
    /// export like an exporter failure.
    pub fn on_before_export<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut dyn StepExporter) -> anyhow::Result<()> + Send + 'static,
    {
        self.before_export.push(Box::new(hook));
        self
    }

    /// Run the export. An empty `requested` list selects every exporter;
    /// otherwise exporters whose type or alias is not requested are dropped.
    pub fn export(mut self, requested: &[&str]) -> Result<BlueprintSchema> {
        let landing_page = match &self.landing_page_resolver {
            Some(resolve) => resolve(&self.landing_page),
            None => self.landing_page.clone(),
        };
        validate_landing_page(&landing_page)?;

        let mut candidates = std::mem::take(&mut self.exporters);
        candidates.extend(builtin_exporters(&self.exported_options));
        for filter in self.filters.iter_mut() {
            candidates = filter(candidates);
        }

        candidates.retain(|exporter| {
            let conforms = is_valid_step_type(exporter.step_type());
            if !conforms {
                warn!(
                    "Skipping exporter {} with invalid step type '{}'",
                    exporter.name(),
                    exporter.step_type()
                );
            }
            conforms
        });

        if !requested.is_empty() {
            candidates.retain(|exporter| requested.iter().any(|r| exporter.answers_to(r)));
        }

        if let Some(denied) = candidates
            .iter()
            .find(|exporter| !exporter.check_capabilities(self.host.actor.as_ref()))
        {
            return Err(BlueprintError::authorization(format!(
                "User does not have the required capabilities to run exporter {} ({})",
                denied.name(),
                denied.step_type()
            )));
        }

        let types: Vec<String> = candidates
            .iter()
            .map(|exporter| exporter.step_type().to_string())
            .collect();
        self.logger.start_export(&types);

        let mut schema = BlueprintSchema::new(landing_page);
        for exporter in candidates.iter_mut() {
            let outcome = self
                .before_export
                .iter_mut()
                .try_for_each(|hook| hook(exporter.as_mut()))
                .and_then(|()| exporter.export(&self.host));

            match outcome {
                Ok(steps) => {
                    debug!("{} produced {} steps", exporter.name(), steps.len());
                    schema.steps.extend(steps);
                }
                Err(e) => {
                    let message = format!("{:#}", e);
                    self.logger.export_failed(exporter.name(), &message);
                    return Err(BlueprintError::validation(format!(
                        "Export failed in {}: {}",
                        exporter.name(),
                        message
                    )));
                }
            }
        }

        self.logger.complete_export(schema.steps.len());
        Ok(schema)
    }
}

impl std::fmt::Debug for ExportPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportPipeline")
            .field("landing_page", &self.landing_page)
            .field("exporters", &self.exporters.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Capabilities, MemoryDatabase, MemoryOptions, MemoryPackages, PackageKind};
    use crate::host::capabilities::SWITCH_THEMES;
    use crate::logger::MemorySink;
    use crate::storage::StorageRegistry;
    use serde_json::json;
    use std::sync::Arc;

    fn host(actor: Capabilities) -> Host {
        Host::new(
            Arc::new(actor),
            Arc::new(MemoryOptions::new().with_option("blogname", json!("Shop"))),
            Arc::new(
                MemoryPackages::new()
                    .with_package(PackageKind::Plugin, "akismet", false)
                    .with_package(PackageKind::Plugin, "woocommerce", true)
                    .with_package(PackageKind::Theme, "storefront", true),
            ),
            Arc::new(MemoryDatabase::new()),
            Arc::new(StorageRegistry::new()),
        )
    }

    #[test]
    fn test_full_export() {
        let schema = ExportPipeline::new(host(Capabilities::all()), &BlueprintConfig::default())
            .export(&[])
            .unwrap();

        let types: Vec<&str> = schema.steps.iter().map(|s| s.step_type()).collect();
        assert_eq!(
            types,
            vec!["setSiteOptions", "installPlugin", "installPlugin", "installTheme"]
        );
        assert_eq!(schema.landing_page, "/");
    }

    #[test]
    fn test_requested_alias_selects_exporter() {
        let schema = ExportPipeline::new(host(Capabilities::all()), &BlueprintConfig::default())
            .export(&["activateTheme", "notAStep"])
            .unwrap();
        assert_eq!(schema.steps.len(), 1);
        assert_eq!(schema.steps[0].step_type(), "installTheme");
    }

    #[test]
    fn test_unrequested_exporter_capability_is_ignored() {
        let actor = Capabilities::all().without(SWITCH_THEMES);
        let schema = ExportPipeline::new(host(actor), &BlueprintConfig::default())
            .export(&["setSiteOptions"])
            .unwrap();
        assert_eq!(schema.steps.len(), 1);
    }

    #[test]
    fn test_missing_capability_aborts() {
        let sink = Arc::new(MemorySink::new());
        let actor = Capabilities::all().without(SWITCH_THEMES);
        let err = ExportPipeline::new(host(actor), &BlueprintConfig::default())
            .with_logger(BlueprintLogger::new(sink.clone()))
            .export(&[])
            .unwrap_err();

        assert!(matches!(err, BlueprintError::Authorization(_)));
        assert!(err.to_string().contains("ThemeExporter"));
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn test_landing_page_resolver() {
        let err = ExportPipeline::new(host(Capabilities::all()), &BlueprintConfig::default())
            .resolve_landing_page_with(|_| "https://example.com/".to_string())
            .export(&[])
            .unwrap_err();
        assert!(matches!(err, BlueprintError::Validation(_)));

        let schema = ExportPipeline::new(host(Capabilities::all()), &BlueprintConfig::default())
            .resolve_landing_page_with(|configured| format!("{}shop", configured))
            .export(&[])
            .unwrap();
        assert_eq!(schema.landing_page, "/shop");
    }

    #[test]
    fn test_before_export_reconfigures_plugins() {
        let schema = ExportPipeline::new(host(Capabilities::all()), &BlueprintConfig::default())
            .on_before_export(|exporter| {
                if exporter.step_type() == "installPlugin" {
                    exporter.configure(&json!({"slugs": ["woocommerce"]}))?;
                }
                Ok(())
            })
            .export(&["installPlugin"])
            .unwrap();
        assert_eq!(schema.steps.len(), 1);
    }

    #[test]
    fn test_filter_can_drop_builtins() {
        let schema = ExportPipeline::new(host(Capabilities::all()), &BlueprintConfig::default())
            .on_filter_exporters(|exporters| {
                exporters
                    .into_iter()
                    .filter(|e| e.step_type() != "installPlugin")
                    .collect()
            })
            .export(&[])
            .unwrap();
        assert!(schema.steps.iter().all(|s| s.step_type() != "installPlugin"));
    }
}
