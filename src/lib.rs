//! Blueprint Library
//!
//! Declarative site-configuration export and import. An export turns site
//! state into an ordered list of typed steps; an import feeds those steps one
//! by one through schema validation, capability checks and a processor.

pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod exporters;
pub mod host;
pub mod import;
pub mod importers;
pub mod json_schema;
pub mod logger;
pub mod result;
pub mod session;
pub mod sql_guard;
pub mod step;
pub mod step_state;
pub mod storage;

// Re-export main types for convenience
pub use config::BlueprintConfig;
pub use error::{BlueprintError, Result};
pub use export::ExportPipeline;
pub use exporters::StepExporter;
pub use host::Host;
pub use import::ImportPipeline;
pub use importers::{ProcessorRegistry, StepProcessor};
pub use result::{MessageLevel, StepResult};
pub use session::{ImportGate, SessionStore};
pub use sql_guard::{SqlGuard, SqlRejection};
pub use step::{BlueprintSchema, StepDefinition};
pub use step_state::{StepLifecycle, StepStage};
pub use storage::StorageRegistry;
