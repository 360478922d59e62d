//! Blueprint configuration file handling.
//!
//! Every field has a default, so `{}` is a valid configuration file.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::exporters::DEFAULT_EXPORTED_OPTIONS;
use crate::step::validate_landing_page;

/// Environment variable that overrides the setup-mode requirement for imports.
pub const ALLOW_IMPORT_ENV: &str = "BLUEPRINT_ALLOW_IMPORT";

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlueprintConfig {
    /// Table prefix the SQL guard uses to recognise protected tables.
    pub table_prefix: String,
    /// Landing page recorded in exported schemas.
    pub landing_page: String,
    /// Largest import payload accepted by the import gate.
    pub max_payload_bytes: usize,
    /// Site is in setup/offline mode and accepts imports.
    pub setup_mode: bool,
    pub allow_import_override: bool,
    /// Option keys serialised by the site-options exporter.
    pub exported_options: Vec<String>,
}

impl Default for BlueprintConfig {
    fn default() -> Self {
        Self {
            table_prefix: "wp_".to_string(),
            landing_page: "/".to_string(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            setup_mode: false,
            allow_import_override: false,
            exported_options: DEFAULT_EXPORTED_OPTIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

fn table_prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]*$").expect("static regex"))
}

impl BlueprintConfig {
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !table_prefix_pattern().is_match(&self.table_prefix) {
            bail!(
                "Invalid table prefix '{}': only letters, digits and underscores are allowed",
                self.table_prefix
            );
        }
        validate_landing_page(&self.landing_page)?;
        if self.max_payload_bytes == 0 {
            bail!("max_payload_bytes must be greater than zero");
        }
        if let Some(key) = self.exported_options.iter().find(|k| k.trim().is_empty()) {
            bail!("Exported option keys cannot be blank (got {:?})", key);
        }
        Ok(())
    }

    /// Whether the environment override for imports is set.
    pub fn env_allows_import() -> bool {
        std::env::var(ALLOW_IMPORT_ENV).is_ok_and(|v| v == "1")
    }
}
