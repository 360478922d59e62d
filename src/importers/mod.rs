//! Step processors: the import side of a blueprint.
//!
//! A processor declares the step type it handles, the JSON Schema its
//! definitions must satisfy and the capabilities the acting user needs. The
//! import pipeline only calls `process` once both checks pass.

mod activate;
mod install;
mod run_sql;
mod site_options;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::host::{Authorizer, Host};
use crate::result::StepResult;
use crate::sql_guard::SqlGuard;
use crate::step::StepDefinition;

pub use activate::{ActivatePlugin, ActivateTheme};
pub use install::{InstallPlugin, InstallTheme};
pub use run_sql::RunSql;
pub use site_options::SetSiteOptions;

/// Step type identifiers of the built-in processors.
pub mod step_types {
    pub const INSTALL_PLUGIN: &str = "installPlugin";
    pub const INSTALL_THEME: &str = "installTheme";
    pub const ACTIVATE_PLUGIN: &str = "activatePlugin";
    pub const ACTIVATE_THEME: &str = "activateTheme";
    pub const SET_SITE_OPTIONS: &str = "setSiteOptions";
    pub const RUN_SQL: &str = "runSql";
}

/// Contract every step processor implements.
///
/// # Contract
///
/// - `check_capabilities()` is pure and is always consulted before `process()`.
/// - `process()` is called at most once per definition; it performs the side
///   effect and describes exactly what happened in the returned result.
pub trait StepProcessor: Send + Sync {
    /// Step type this processor handles (e.g. `"runSql"`).
    fn step_type(&self) -> &str;

    /// Other keys this processor may legitimately be registered under.
    fn aliases(&self) -> &[&'static str] {
        &[]
    }

    /// Whether a registry key names this processor.
    fn handles(&self, step_type: &str) -> bool {
        self.step_type() == step_type || self.aliases().iter().any(|a| *a == step_type)
    }

    /// JSON Schema for the full step document, `"step"` key included.
    fn schema(&self) -> Value;

    fn check_capabilities(&self, definition: &StepDefinition, actor: &dyn Authorizer) -> bool;

    fn process(&self, definition: &StepDefinition, host: &Host) -> StepResult;

    /// Short implementation name for the audit trail.
    fn name(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

/// Step type → processor index. Later registrations replace earlier ones.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn StepProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the six built-in processors.
    pub fn with_builtins(guard: SqlGuard) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(InstallPlugin));
        registry.register(Arc::new(InstallTheme));
        registry.register(Arc::new(ActivatePlugin));
        registry.register(Arc::new(ActivateTheme));
        registry.register(Arc::new(SetSiteOptions));
        registry.register(Arc::new(RunSql::new(guard)));
        registry
    }

    /// Register under the processor's own step type.
    pub fn register(&mut self, processor: Arc<dyn StepProcessor>) {
        let key = processor.step_type().to_string();
        self.processors.insert(key, processor);
    }

    /// Register under an explicit key. Lookups through a key that differs
    /// from the processor's declared type are reported as a type mismatch.
    pub fn register_as(&mut self, step_type: impl Into<String>, processor: Arc<dyn StepProcessor>) {
        self.processors.insert(step_type.into(), processor);
    }

    pub fn get(&self, step_type: &str) -> Option<&Arc<dyn StepProcessor>> {
        self.processors.get(step_type)
    }

    /// Registered keys, sorted.
    pub fn step_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.processors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("step_types", &self.step_types())
            .finish()
    }
}

/// `{"type": "string", "enum": [step_type]}`, shared by every step schema.
pub(crate) fn step_property(step_type: &str) -> Value {
    serde_json::json!({ "type": "string", "enum": [step_type] })
}
