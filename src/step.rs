//! Step definitions and the schema document.
//!
//! Wire format:
//! ```json
//! {
//!   "landingPage": "/",
//!   "steps": [
//!     { "step": "setSiteOptions", "options": { "blogname": "Shop" } },
//!     { "step": "installPlugin", "pluginData": { "resource": "wordpress.org/plugins", "slug": "woocommerce" } }
//!   ]
//! }
//! ```
//! Each element of `steps` carries its type under `"step"`; every other key is
//! the payload and is validated against the processor's JSON Schema.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BlueprintError, Result};

/// One step document. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    #[serde(rename = "step")]
    step_type: String,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

impl StepDefinition {
    pub fn new(step_type: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            step_type: step_type.into(),
            payload,
        }
    }

    /// Build a definition from a `json!` object literal. Non-object values
    /// produce an empty payload.
    pub fn from_value(step_type: impl Into<String>, payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(step_type, payload)
    }

    pub fn step_type(&self) -> &str {
        &self.step_type
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// The full document as it appears on the wire, `"step"` key included.
    pub fn to_document(&self) -> Value {
        let mut doc = self.payload.clone();
        doc.insert("step".to_string(), Value::String(self.step_type.clone()));
        Value::Object(doc)
    }
}

/// Ordered list of steps produced by an export and consumed by an import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlueprintSchema {
    #[serde(rename = "landingPage")]
    pub landing_page: String,
    pub steps: Vec<StepDefinition>,
}

impl BlueprintSchema {
    pub fn new(landing_page: impl Into<String>) -> Self {
        Self {
            landing_page: landing_page.into(),
            steps: Vec::new(),
        }
    }

    /// Parse a schema document and check its landing page.
    pub fn from_json(json: &str) -> Result<Self> {
        let schema: Self = serde_json::from_str(json)?;
        validate_landing_page(&schema.landing_page)?;
        Ok(schema)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn landing_page_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^/$|^/[^/].*").expect("static regex"))
}

fn step_type_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*(/[A-Za-z][A-Za-z0-9_-]*)?$").expect("static regex")
    })
}

/// Landing pages must be root-relative paths, never absolute or
/// protocol-relative URLs.
pub fn validate_landing_page(path: &str) -> Result<()> {
    if landing_page_pattern().is_match(path) {
        Ok(())
    } else {
        Err(BlueprintError::validation(format!(
            "Invalid landing page '{}': must be a path relative to the site root",
            path
        )))
    }
}

/// Step types are `name` or `vendor/name`.
pub fn is_valid_step_type(step_type: &str) -> bool {
    step_type_pattern().is_match(step_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_landing_page_rules() {
        assert!(validate_landing_page("/").is_ok());
        assert!(validate_landing_page("/wp-admin/admin.php?page=wc-admin").is_ok());

        assert!(validate_landing_page("").is_err());
        assert!(validate_landing_page("https://evil.example/").is_err());
        assert!(validate_landing_page("//evil.example/").is_err());
        assert!(validate_landing_page("relative/path").is_err());
    }

    #[test]
    fn test_step_type_rules() {
        assert!(is_valid_step_type("runSql"));
        assert!(is_valid_step_type("acme/set-tax-rates"));
        assert!(!is_valid_step_type(""));
        assert!(!is_valid_step_type("1step"));
        assert!(!is_valid_step_type("a/b/c"));
        assert!(!is_valid_step_type("has space"));
    }

    #[test]
    fn test_step_flattens_payload() {
        let step = StepDefinition::from_value("setSiteOptions", json!({"options": {"a": 1}}));
        let encoded = serde_json::to_value(&step).unwrap();
        assert_eq!(encoded, json!({"step": "setSiteOptions", "options": {"a": 1}}));
        assert_eq!(step.to_document(), encoded);
    }

    #[test]
    fn test_schema_from_json() {
        let json = r#"{
            "landingPage": "/shop",
            "steps": [
                {"step": "activateTheme", "themeName": "storefront"},
                {"step": "runSql", "sql": {"name": "fix.sql", "contents": "UPDATE t SET a=1"}}
            ]
        }"#;

        let schema = BlueprintSchema::from_json(json).unwrap();
        assert_eq!(schema.landing_page, "/shop");
        assert_eq!(schema.steps.len(), 2);
        assert_eq!(schema.steps[0].step_type(), "activateTheme");
        assert_eq!(schema.steps[0].get("themeName"), Some(&json!("storefront")));
        assert!(schema.steps[0].get("step").is_none());
    }

    #[test]
    fn test_schema_rejects_absolute_landing_page() {
        let json = r#"{"landingPage": "http://x.test/", "steps": []}"#;
        assert!(matches!(
            BlueprintSchema::from_json(json),
            Err(BlueprintError::Validation(_))
        ));
    }

    #[test]
    fn test_step_without_type_is_malformed() {
        let json = r#"{"landingPage": "/", "steps": [{"options": {}}]}"#;
        assert!(matches!(
            BlueprintSchema::from_json(json),
            Err(BlueprintError::Json(_))
        ));
    }
}
