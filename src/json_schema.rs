//! JSON Schema validation for step definitions.
//!
//! Processors describe their payload with a JSON Schema document. The
//! pipeline only depends on the `SchemaValidator` trait; `JsonSchemaValidator`
//! implements the subset of the vocabulary the step schemas use:
//! `type`, `properties`, `required`, `additionalProperties`, `items`,
//! `enum`, `const`, `pattern`, `minLength`, `maxLength`, `minItems`,
//! `minProperties`, `anyOf` and `oneOf`.
//!
//! Every violation is collected; validation does not stop at the first one.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use regex::Regex;
use serde_json::{Map, Value};

/// Outcome of validating one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validates a document against a schema.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, document: &Value, schema: &Value) -> ValidationReport;
}

/// Built-in validator for the step schema vocabulary.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSchemaValidator;

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, document: &Value, schema: &Value) -> ValidationReport {
        let mut errors = Vec::new();
        check(document, schema, "", &mut errors);
        ValidationReport { errors }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(n) if n.as_f64().is_some_and(|f| f.fract() == 0.0) => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    let actual = type_name(value);
    actual == expected || (expected == "number" && actual == "integer")
}

/// `pattern` keywords compile once and are shared across validations.
fn compiled_pattern(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    static CACHE: OnceLock<Mutex<HashMap<String, Regex>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));

    if let Ok(compiled) = cache.lock() {
        if let Some(re) = compiled.get(pattern) {
            return Ok(re.clone());
        }
    }
    let re = Regex::new(pattern)?;
    if let Ok(mut compiled) = cache.lock() {
        compiled.insert(pattern.to_string(), re.clone());
    }
    Ok(re)
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "/" } else { path }
}

fn check(value: &Value, schema: &Value, path: &str, errors: &mut Vec<String>) {
    let Some(schema) = schema.as_object() else {
        // `true` accepts everything, `false` nothing.
        if schema == &Value::Bool(false) {
            errors.push(format!("{}: no value is allowed here", display_path(path)));
        }
        return;
    };

    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| matches_type(value, t)) {
            errors.push(format!(
                "{}: expected {}, found {}",
                display_path(path),
                allowed.join(" or "),
                type_name(value)
            ));
            // Structural keywords are meaningless on the wrong type.
            return;
        }
    }

    if let Some(Value::Array(options)) = schema.get("enum") {
        if !options.contains(value) {
            errors.push(format!(
                "{}: value {} is not one of {}",
                display_path(path),
                value,
                Value::Array(options.clone())
            ));
        }
    }

    if let Some(expected) = schema.get("const") {
        if expected != value {
            errors.push(format!(
                "{}: expected constant {}",
                display_path(path),
                expected
            ));
        }
    }

    match value {
        Value::String(s) => check_string(s, schema, path, errors),
        Value::Array(items) => check_array(items, schema, path, errors),
        Value::Object(map) => check_object(map, schema, path, errors),
        _ => {}
    }

    if let Some(Value::Array(branches)) = schema.get("anyOf") {
        let any = branches.iter().any(|branch| {
            let mut scratch = Vec::new();
            check(value, branch, path, &mut scratch);
            scratch.is_empty()
        });
        if !any {
            errors.push(format!(
                "{}: does not match any allowed shape",
                display_path(path)
            ));
        }
    }

    if let Some(Value::Array(branches)) = schema.get("oneOf") {
        let matched = branches
            .iter()
            .filter(|branch| {
                let mut scratch = Vec::new();
                check(value, branch, path, &mut scratch);
                scratch.is_empty()
            })
            .count();
        if matched != 1 {
            errors.push(format!(
                "{}: must match exactly one allowed shape, matched {}",
                display_path(path),
                matched
            ));
        }
    }
}

fn check_string(s: &str, schema: &Map<String, Value>, path: &str, errors: &mut Vec<String>) {
    let length = s.chars().count() as u64;
    if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
        if length < min {
            errors.push(format!(
                "{}: must be at least {} characters long",
                display_path(path),
                min
            ));
        }
    }
    if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
        if length > max {
            errors.push(format!(
                "{}: must be at most {} characters long",
                display_path(path),
                max
            ));
        }
    }
    if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
        match compiled_pattern(pattern) {
            Ok(re) if !re.is_match(s) => errors.push(format!(
                "{}: does not match pattern {}",
                display_path(path),
                pattern
            )),
            Ok(_) => {}
            Err(e) => errors.push(format!(
                "{}: schema pattern {} is invalid: {}",
                display_path(path),
                pattern,
                e
            )),
        }
    }
}

fn check_array(items: &[Value], schema: &Map<String, Value>, path: &str, errors: &mut Vec<String>) {
    if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
        if (items.len() as u64) < min {
            errors.push(format!(
                "{}: must contain at least {} items",
                display_path(path),
                min
            ));
        }
    }
    if let Some(item_schema) = schema.get("items") {
        for (i, item) in items.iter().enumerate() {
            check(item, item_schema, &format!("{}/{}", path, i), errors);
        }
    }
}

fn check_object(
    map: &Map<String, Value>,
    schema: &Map<String, Value>,
    path: &str,
    errors: &mut Vec<String>,
) {
    if let Some(Value::Array(required)) = schema.get("required") {
        for key in required.iter().filter_map(Value::as_str) {
            if !map.contains_key(key) {
                errors.push(format!(
                    "{}: missing required property '{}'",
                    display_path(path),
                    key
                ));
            }
        }
    }

    if let Some(min) = schema.get("minProperties").and_then(Value::as_u64) {
        if (map.len() as u64) < min {
            errors.push(format!(
                "{}: must have at least {} properties",
                display_path(path),
                min
            ));
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    let additional = schema.get("additionalProperties");

    for (key, child) in map {
        let child_path = format!("{}/{}", path, key);
        match properties.and_then(|p| p.get(key)) {
            Some(child_schema) => check(child, child_schema, &child_path, errors),
            None => match additional {
                Some(Value::Bool(false)) => errors.push(format!(
                    "{}: unexpected property '{}'",
                    display_path(path),
                    key
                )),
                Some(extra @ Value::Object(_)) => check(child, extra, &child_path, errors),
                _ => {}
            },
        }
    }
}
