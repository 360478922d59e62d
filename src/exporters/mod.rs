//! Step exporters: the export side of a blueprint.
//!
//! An exporter reads current site state through the host and turns it into
//! zero or more step definitions of its declared type.

mod packages;
mod site_options;

use serde_json::Value;

use crate::host::{Authorizer, Host};
use crate::step::StepDefinition;

pub use packages::{PluginsExporter, ThemeExporter};
pub use site_options::{DEFAULT_EXPORTED_OPTIONS, SiteOptionsExporter};

pub trait StepExporter: Send + Sync {
    /// Step type of the definitions this exporter produces.
    fn step_type(&self) -> &str;

    /// Additional step types a caller may request this exporter by.
    fn aliases(&self) -> &[&'static str] {
        &[]
    }

    fn check_capabilities(&self, actor: &dyn Authorizer) -> bool;

    fn export(&self, host: &Host) -> anyhow::Result<Vec<StepDefinition>>;

    /// Apply caller settings before export. Exporters without settings
    /// ignore them.
    fn configure(&mut self, _settings: &Value) -> anyhow::Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Whether a requested step type selects this exporter.
    fn answers_to(&self, requested: &str) -> bool {
        self.step_type() == requested || self.aliases().iter().any(|a| *a == requested)
    }
}

/// The built-in exporters in their export order.
pub fn builtin_exporters(exported_options: &[String]) -> Vec<Box<dyn StepExporter>> {
    vec![
        Box::new(SiteOptionsExporter::new(exported_options.iter().cloned())),
        Box::new(PluginsExporter::new()),
        Box::new(ThemeExporter),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_order_and_aliases() {
        let exporters = builtin_exporters(&["blogname".to_string()]);
        let types: Vec<&str> = exporters.iter().map(|e| e.step_type()).collect();
        assert_eq!(types, vec!["setSiteOptions", "installPlugin", "installTheme"]);

        assert!(exporters[1].answers_to("activatePlugin"));
        assert!(exporters[2].answers_to("activateTheme"));
        assert!(!exporters[0].answers_to("activatePlugin"));
    }

    #[test]
    fn test_exporter_names() {
        let exporters = builtin_exporters(&[]);
        let names: Vec<&str> = exporters.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["SiteOptionsExporter", "PluginsExporter", "ThemeExporter"]);
    }
}
