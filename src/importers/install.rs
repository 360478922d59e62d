//! `installPlugin` and `installTheme`.
//!
//! ```json
//! { "step": "installPlugin",
//!   "pluginData": { "resource": "wordpress.org/plugins", "slug": "woocommerce" },
//!   "options": { "activate": true } }
//! ```

use serde_json::{Value, json};
use tracing::info;

use super::{StepProcessor, step_property, step_types};
use crate::host::capabilities::{
    ACTIVATE_PLUGINS, INSTALL_PLUGINS, INSTALL_THEMES, SWITCH_THEMES,
};
use crate::host::{Authorizer, Host, PackageKind};
use crate::result::StepResult;
use crate::step::StepDefinition;

/// Everything that differs between the plugin and theme variants.
struct PackageStep {
    kind: PackageKind,
    step_type: &'static str,
    data_key: &'static str,
    install_capability: &'static str,
    activate_capability: &'static str,
}

const PLUGIN: PackageStep = PackageStep {
    kind: PackageKind::Plugin,
    step_type: step_types::INSTALL_PLUGIN,
    data_key: "pluginData",
    install_capability: INSTALL_PLUGINS,
    activate_capability: ACTIVATE_PLUGINS,
};

const THEME: PackageStep = PackageStep {
    kind: PackageKind::Theme,
    step_type: step_types::INSTALL_THEME,
    data_key: "themeData",
    install_capability: INSTALL_THEMES,
    activate_capability: SWITCH_THEMES,
};

impl PackageStep {
    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "step": step_property(self.step_type),
                self.data_key: {
                    "type": "object",
                    "properties": {
                        "resource": { "type": "string", "minLength": 1 },
                        "slug": { "type": "string", "pattern": "^[A-Za-z0-9][A-Za-z0-9._-]*$" }
                    },
                    "required": ["resource", "slug"]
                },
                "options": {
                    "type": "object",
                    "properties": { "activate": { "type": "boolean" } }
                }
            },
            "required": ["step", self.data_key]
        })
    }

    fn wants_activation(&self, definition: &StepDefinition) -> bool {
        definition
            .get("options")
            .and_then(|o| o.get("activate"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    fn check_capabilities(&self, definition: &StepDefinition, actor: &dyn Authorizer) -> bool {
        actor.can(self.install_capability)
            && (!self.wants_activation(definition) || actor.can(self.activate_capability))
    }

    fn process(&self, definition: &StepDefinition, host: &Host) -> StepResult {
        let mut result = StepResult::success(self.step_type);
        let data = definition.get(self.data_key);
        let field = |name: &str| data.and_then(|d| d.get(name)).and_then(Value::as_str);
        let (Some(resource), Some(slug)) = (field("resource"), field("slug")) else {
            result.add_error(format!("{} requires a resource and a slug", self.data_key));
            return result;
        };

        if !host.storage.is_supported(resource) {
            result.add_error(format!("Unsupported resource type: {}", resource));
            return result;
        }

        match host.packages.find(self.kind, slug) {
            Err(e) => {
                result.add_error(format!("Unable to list installed {}s: {}", self.kind, e));
                return result;
            }
            Ok(Some(_)) => {
                result.add_info(format!("{} '{}' is already installed", self.kind, slug));
            }
            Ok(None) => {
                let Some(source) = host.storage.download(slug, resource) else {
                    result.add_error(format!("No {} found for '{}'", self.kind, slug));
                    return result;
                };
                if let Err(e) = host.packages.install(self.kind, slug, &source) {
                    result.add_error(format!("Failed to install {} '{}': {}", self.kind, slug, e));
                    return result;
                }
                info!("Installed {} {} from {:?}", self.kind, slug, source);
                result.add_info(format!("Installed {} '{}'", self.kind, slug));
            }
        }

        if self.wants_activation(definition) {
            match host.packages.activate(self.kind, slug) {
                Ok(()) => result.add_info(format!("Activated {} '{}'", self.kind, slug)),
                Err(e) => result.add_error(format!(
                    "Failed to activate {} '{}': {}",
                    self.kind, slug, e
                )),
            }
        }

        result
    }
}

/// Installs (and optionally activates) a plugin fetched through the storage registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstallPlugin;

impl StepProcessor for InstallPlugin {
    fn step_type(&self) -> &str {
        PLUGIN.step_type
    }

    fn schema(&self) -> Value {
        PLUGIN.schema()
    }

    fn check_capabilities(&self, definition: &StepDefinition, actor: &dyn Authorizer) -> bool {
        PLUGIN.check_capabilities(definition, actor)
    }

    fn process(&self, definition: &StepDefinition, host: &Host) -> StepResult {
        PLUGIN.process(definition, host)
    }
}

/// Installs (and optionally activates) a theme fetched through the storage registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstallTheme;

impl StepProcessor for InstallTheme {
    fn step_type(&self) -> &str {
        THEME.step_type
    }

    fn schema(&self) -> Value {
        THEME.schema()
    }

    fn check_capabilities(&self, definition: &StepDefinition, actor: &dyn Authorizer) -> bool {
        THEME.check_capabilities(definition, actor)
    }

    fn process(&self, definition: &StepDefinition, host: &Host) -> StepResult {
        THEME.process(definition, host)
    }
}
