use std::collections::BTreeSet;

use anyhow::{Context, bail};
use serde_json::{Value, json};

use super::StepExporter;
use crate::host::capabilities::{ACTIVATE_PLUGINS, SWITCH_THEMES};
use crate::host::{Authorizer, Host, PackageKind};
use crate::importers::step_types;
use crate::step::StepDefinition;

/// One `installPlugin` step per installed plugin; `activate` mirrors whether
/// the plugin is currently active.
///
/// Settings accepted by [`StepExporter::configure`]:
/// `{"slugs": ["woocommerce", ...]}` limits the export to those plugins,
/// `{"slugs": null}` clears the limit.
#[derive(Debug, Clone, Default)]
pub struct PluginsExporter {
    only: Option<BTreeSet<String>>,
}

impl PluginsExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn only<I, S>(mut self, slugs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = Some(slugs.into_iter().map(Into::into).collect());
        self
    }
}

impl StepExporter for PluginsExporter {
    fn step_type(&self) -> &str {
        step_types::INSTALL_PLUGIN
    }

    fn aliases(&self) -> &[&'static str] {
        &[step_types::ACTIVATE_PLUGIN]
    }

    fn check_capabilities(&self, actor: &dyn Authorizer) -> bool {
        actor.can(ACTIVATE_PLUGINS)
    }

    fn configure(&mut self, settings: &Value) -> anyhow::Result<()> {
        match settings.get("slugs") {
            None => {}
            Some(Value::Null) => self.only = None,
            Some(Value::Array(items)) => {
                let slugs = items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect::<Option<BTreeSet<_>>>()
                    .context("slugs must be strings")?;
                self.only = Some(slugs);
            }
            Some(other) => bail!("slugs must be a list, got {}", other),
        }
        Ok(())
    }

    fn export(&self, host: &Host) -> anyhow::Result<Vec<StepDefinition>> {
        let plugins = host
            .packages
            .installed(PackageKind::Plugin)
            .context("Unable to list installed plugins")?;

        Ok(plugins
            .into_iter()
            .filter(|p| self.only.as_ref().is_none_or(|only| only.contains(&p.slug)))
            .map(|p| {
                StepDefinition::from_value(
                    step_types::INSTALL_PLUGIN,
                    json!({
                        "pluginData": {
                            "resource": PackageKind::Plugin.default_resource(),
                            "slug": p.slug
                        },
                        "options": { "activate": p.active }
                    }),
                )
            })
            .collect())
    }
}

/// An `installTheme` step for the active theme.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThemeExporter;

impl StepExporter for ThemeExporter {
    fn step_type(&self) -> &str {
        step_types::INSTALL_THEME
    }

    fn aliases(&self) -> &[&'static str] {
        &[step_types::ACTIVATE_THEME]
    }

    fn check_capabilities(&self, actor: &dyn Authorizer) -> bool {
        actor.can(SWITCH_THEMES)
    }

    fn export(&self, host: &Host) -> anyhow::Result<Vec<StepDefinition>> {
        let themes = host
            .packages
            .installed(PackageKind::Theme)
            .context("Unable to list installed themes")?;

        Ok(themes
            .into_iter()
            .filter(|t| t.active)
            .map(|t| {
                StepDefinition::from_value(
                    step_types::INSTALL_THEME,
                    json!({
                        "themeData": {
                            "resource": PackageKind::Theme.default_resource(),
                            "slug": t.slug
                        },
                        "options": { "activate": true }
                    }),
                )
            })
            .collect())
    }
}
