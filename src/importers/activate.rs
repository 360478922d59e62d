//! `activatePlugin` and `activateTheme`.

use serde_json::{Value, json};

use super::{StepProcessor, step_property, step_types};
use crate::host::capabilities::{ACTIVATE_PLUGINS, SWITCH_THEMES};
use crate::host::{Authorizer, Host, PackageKind};
use crate::result::StepResult;
use crate::step::StepDefinition;

fn schema(step_type: &str, name_key: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "step": step_property(step_type),
            name_key: { "type": "string", "minLength": 1 }
        },
        "required": ["step", name_key]
    })
}

fn activate(
    kind: PackageKind,
    step_type: &str,
    name_key: &str,
    definition: &StepDefinition,
    host: &Host,
) -> StepResult {
    let mut result = StepResult::success(step_type);
    let Some(slug) = definition.get(name_key).and_then(Value::as_str) else {
        result.add_error(format!("{} is required", name_key));
        return result;
    };

    match host.packages.find(kind, slug) {
        Err(e) => result.add_error(format!("Unable to list installed {}s: {}", kind, e)),
        Ok(None) => result.add_error(format!("{} '{}' is not installed", kind, slug)),
        Ok(Some(package)) if package.active => {
            result.add_info(format!("{} '{}' is already active", kind, slug))
        }
        Ok(Some(_)) => match host.packages.activate(kind, slug) {
            Ok(()) => result.add_info(format!("Activated {} '{}'", kind, slug)),
            Err(e) => result.add_error(format!("Failed to activate {} '{}': {}", kind, slug, e)),
        },
    }
    result
}

/// Activates an already installed plugin.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActivatePlugin;

impl StepProcessor for ActivatePlugin {
    fn step_type(&self) -> &str {
        step_types::ACTIVATE_PLUGIN
    }

    fn schema(&self) -> Value {
        schema(step_types::ACTIVATE_PLUGIN, "pluginName")
    }

    fn check_capabilities(&self, _definition: &StepDefinition, actor: &dyn Authorizer) -> bool {
        actor.can(ACTIVATE_PLUGINS)
    }

    fn process(&self, definition: &StepDefinition, host: &Host) -> StepResult {
        activate(
            PackageKind::Plugin,
            step_types::ACTIVATE_PLUGIN,
            "pluginName",
            definition,
            host,
        )
    }
}

/// Switches the site to an already installed theme.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActivateTheme;

impl StepProcessor for ActivateTheme {
    fn step_type(&self) -> &str {
        step_types::ACTIVATE_THEME
    }

    fn schema(&self) -> Value {
        schema(step_types::ACTIVATE_THEME, "themeName")
    }

    fn check_capabilities(&self, _definition: &StepDefinition, actor: &dyn Authorizer) -> bool {
        actor.can(SWITCH_THEMES)
    }

    fn process(&self, definition: &StepDefinition, host: &Host) -> StepResult {
        activate(
            PackageKind::Theme,
            step_types::ACTIVATE_THEME,
            "themeName",
            definition,
            host,
        )
    }
}
