//! `setSiteOptions`: writes key-value site options.
//!
//! ```json
//! { "step": "setSiteOptions", "options": { "blogname": "Shop", "posts_per_page": 12 } }
//! ```

use serde_json::{Value, json};
use tracing::debug;

use super::{StepProcessor, step_property, step_types};
use crate::host::capabilities::MANAGE_OPTIONS;
use crate::host::{Authorizer, Host};
use crate::result::StepResult;
use crate::step::StepDefinition;

#[derive(Debug, Default, Clone, Copy)]
pub struct SetSiteOptions;

impl StepProcessor for SetSiteOptions {
    fn step_type(&self) -> &str {
        step_types::SET_SITE_OPTIONS
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "step": step_property(step_types::SET_SITE_OPTIONS),
                "options": { "type": "object" }
            },
            "required": ["step", "options"]
        })
    }

    fn check_capabilities(&self, _definition: &StepDefinition, actor: &dyn Authorizer) -> bool {
        actor.can(MANAGE_OPTIONS)
    }

    fn process(&self, definition: &StepDefinition, host: &Host) -> StepResult {
        let mut result = StepResult::success(step_types::SET_SITE_OPTIONS);
        let Some(options) = definition.get("options").and_then(Value::as_object) else {
            result.add_error("options must be an object");
            return result;
        };
        if options.is_empty() {
            result.add_warn("No options to set");
            return result;
        }

        for (key, value) in options {
            if host.options.get_option(key).as_ref() == Some(value) {
                debug!("Option {} unchanged", key);
                result.add_info(format!("{} already has the requested value", key));
                continue;
            }
            match host.options.update_option(key, value.clone()) {
                Ok(true) => result.add_info(format!("{} has been updated", key)),
                Ok(false) => result.add_error(format!("Unable to update {}", key)),
                Err(e) => result.add_error(format!("Unable to update {}: {}", key, e)),
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Capabilities, MemoryDatabase, MemoryOptions, MemoryPackages, OptionStore};
    use crate::result::MessageLevel;
    use crate::storage::StorageRegistry;
    use std::sync::Arc;

    fn host(options: Arc<MemoryOptions>) -> Host {
        Host::new(
            Arc::new(Capabilities::all()),
            options,
            Arc::new(MemoryPackages::new()),
            Arc::new(MemoryDatabase::new()),
            Arc::new(StorageRegistry::new()),
        )
    }

    #[test]
    fn test_updates_and_reports_each_option() {
        let options = Arc::new(
            MemoryOptions::new()
                .with_option("blogname", json!("Shop"))
                .read_only("siteurl"),
        );
        let step = StepDefinition::from_value(
            "setSiteOptions",
            json!({"options": {"blogname": "Shop", "posts_per_page": 12, "siteurl": "x"}}),
        );

        let result = SetSiteOptions.process(&step, &host(options.clone()));

        assert!(!result.is_success());
        assert_eq!(result.messages(Some(MessageLevel::Info)).len(), 2);
        assert_eq!(result.joined(MessageLevel::Error), "Unable to update siteurl");
        assert_eq!(options.get_option("posts_per_page"), Some(json!(12)));
    }

    #[test]
    fn test_empty_options_warns() {
        let step = StepDefinition::from_value("setSiteOptions", json!({"options": {}}));
        let result = SetSiteOptions.process(&step, &host(Arc::new(MemoryOptions::new())));
        assert!(result.is_success());
        assert_eq!(result.messages(Some(MessageLevel::Warn)).len(), 1);
    }

    #[test]
    fn test_requires_manage_options() {
        let step = StepDefinition::from_value("setSiteOptions", json!({"options": {}}));
        assert!(!SetSiteOptions.check_capabilities(&step, &Capabilities::none()));
        assert!(SetSiteOptions.check_capabilities(
            &step,
            &Capabilities::from_names(["manage_options"])
        ));
    }
}
