use serde_json::{Map, Value};

use super::StepExporter;
use crate::host::capabilities::MANAGE_OPTIONS;
use crate::host::{Authorizer, Host};
use crate::importers::step_types;
use crate::step::StepDefinition;

/// General settings exported when the configuration does not name any.
pub const DEFAULT_EXPORTED_OPTIONS: &[&str] = &[
    "blogname",
    "blogdescription",
    "timezone_string",
    "date_format",
    "time_format",
    "start_of_week",
    "posts_per_page",
    "permalink_structure",
];

/// Serialises a fixed list of options into one `setSiteOptions` step.
#[derive(Debug, Clone)]
pub struct SiteOptionsExporter {
    keys: Vec<String>,
}

impl SiteOptionsExporter {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for SiteOptionsExporter {
    fn default() -> Self {
        Self::new(DEFAULT_EXPORTED_OPTIONS.iter().copied())
    }
}

impl StepExporter for SiteOptionsExporter {
    fn step_type(&self) -> &str {
        step_types::SET_SITE_OPTIONS
    }

    fn check_capabilities(&self, actor: &dyn Authorizer) -> bool {
        actor.can(MANAGE_OPTIONS)
    }

    fn export(&self, host: &Host) -> anyhow::Result<Vec<StepDefinition>> {
        let options: Map<String, Value> = self
            .keys
            .iter()
            .filter_map(|key| host.options.get_option(key).map(|v| (key.clone(), v)))
            .collect();
        if options.is_empty() {
            return Ok(Vec::new());
        }

        let mut payload = Map::new();
        payload.insert("options".to_string(), Value::Object(options));
        Ok(vec![StepDefinition::new(step_types::SET_SITE_OPTIONS, payload)])
    }
}
