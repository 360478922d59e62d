//! Pipeline audit trail.
//!
//! `BlueprintLogger` turns export/import lifecycle events into leveled,
//! structured records and hands them to a `LogSink`. The default sink
//! forwards to `tracing`; `MemorySink` keeps records around for inspection.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{Value, json};
use strum::Display;

use crate::result::{MessageLevel, StepResult};

/// Severity of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Destination for audit records.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, context: &Value);
}

/// Forwards records to `tracing`, context attached as a structured field.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str, context: &Value) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "blueprint", %context, "{}", message),
            LogLevel::Info => tracing::info!(target: "blueprint", %context, "{}", message),
            LogLevel::Warning => tracing::warn!(target: "blueprint", %context, "{}", message),
            LogLevel::Error => tracing::error!(target: "blueprint", %context, "{}", message),
        }
    }
}

/// A recorded audit entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub context: Value,
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Entries whose message starts with `prefix`.
    pub fn find(&self, prefix: &str) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.message.starts_with(prefix))
            .collect()
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, message: &str, context: &Value) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(LogEntry {
                level,
                message: message.to_string(),
                context: context.clone(),
            });
        }
    }
}

/// Writes pipeline lifecycle events to a sink.
#[derive(Clone)]
pub struct BlueprintLogger {
    sink: Arc<dyn LogSink>,
}

impl Default for BlueprintLogger {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl BlueprintLogger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    pub fn start_export(&self, exporter_types: &[String]) {
        self.sink.log(
            LogLevel::Info,
            &format!("Starting export of {} steps", exporter_types.len()),
            &json!({ "exporters": exporter_types }),
        );
    }

    pub fn complete_export(&self, step_count: usize) {
        self.sink.log(
            LogLevel::Info,
            "Export completed",
            &json!({ "steps": step_count }),
        );
    }

    pub fn export_failed(&self, exporter: &str, error: &str) {
        self.sink.log(
            LogLevel::Error,
            &format!("Export failed for {}", exporter),
            &json!({ "exporter": exporter, "error": error }),
        );
    }

    pub fn start_import(&self, step_type: &str, processor: &str) {
        self.sink.log(
            LogLevel::Info,
            &format!("Starting import of {}", step_type),
            &json!({ "step": step_type, "importer": processor }),
        );
    }

    pub fn complete_import(&self, result: &StepResult) {
        self.sink.log(
            LogLevel::Info,
            &format!("Import of {} completed", result.step_type()),
            &json!({ "step": result.step_type(), "messages": result.messages(None) }),
        );
    }

    pub fn import_failed(&self, result: &StepResult) {
        self.sink.log(
            LogLevel::Error,
            &format!("Import of {} failed", result.step_type()),
            &json!({
                "step": result.step_type(),
                "errors": result.joined(MessageLevel::Error),
                "messages": result.messages(None),
            }),
        );
    }

    /// Record the outcome of a processed step at the matching level.
    pub fn finish_import(&self, result: &StepResult) {
        if result.is_success() {
            self.complete_import(result);
        } else {
            self.import_failed(result);
        }
    }
}

impl std::fmt::Debug for BlueprintLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlueprintLogger").finish_non_exhaustive()
    }
}
