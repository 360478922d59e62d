//! Import pipeline.
//!
//! Steps run strictly in order. Each step is resolved to a processor,
//! validated against that processor's schema, authorized and only then
//! processed. A failing step produces a failed `StepResult` and the run moves
//! on to the next step.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::BlueprintConfig;
use crate::error::Result;
use crate::importers::{ProcessorRegistry, StepProcessor};
use crate::json_schema::{JsonSchemaValidator, SchemaValidator};
use crate::logger::BlueprintLogger;
use crate::host::Host;
use crate::result::StepResult;
use crate::sql_guard::SqlGuard;
use crate::step::StepDefinition;
use crate::step_state::{StepLifecycle, StepStage};

/// Step type of the synthetic result that opens every import run.
pub const IMPORT_SCHEMA_STEP: &str = "ImportSchema";

pub const NO_IMPORTER: &str = "Unable to find an importer";
pub const INCORRECT_IMPORTER: &str = "Incorrect importer type";
pub const INSUFFICIENT_CAPABILITIES: &str =
    "User does not have the required capabilities to run step";

pub struct ImportPipeline {
    host: Host,
    registry: ProcessorRegistry,
    validator: Box<dyn SchemaValidator>,
    logger: BlueprintLogger,
}

impl ImportPipeline {
    /// Pipeline over an explicit registry.
    pub fn new(host: Host, registry: ProcessorRegistry) -> Self {
        Self {
            host,
            registry,
            validator: Box::new(JsonSchemaValidator),
            logger: BlueprintLogger::default(),
        }
    }

    /// Pipeline with the built-in processors, guarding SQL steps with the
    /// configured table prefix.
    pub fn with_builtins(host: Host, config: &BlueprintConfig) -> Result<Self> {
        let guard = SqlGuard::new(&config.table_prefix)?;
        Ok(Self::new(host, ProcessorRegistry::with_builtins(guard)))
    }

    /// Register an external processor. It replaces any built-in processor of
    /// the same step type.
    pub fn with_processor(mut self, processor: Arc<dyn StepProcessor>) -> Self {
        self.registry.register(processor);
        self
    }

    pub fn with_processor_as(
        mut self,
        step_type: impl Into<String>,
        processor: Arc<dyn StepProcessor>,
    ) -> Self {
        self.registry.register_as(step_type, processor);
        self
    }

    pub fn with_validator(mut self, validator: Box<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_logger(mut self, logger: BlueprintLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    /// Import every step. The first entry is always a successful
    /// `ImportSchema` result; entry `i + 1` belongs to `steps[i]`.
    pub fn import(&self, steps: &[StepDefinition]) -> Vec<StepResult> {
        let mut results = Vec::with_capacity(steps.len() + 1);
        results.push(StepResult::success(IMPORT_SCHEMA_STEP));
        results.extend(steps.iter().map(|step| self.import_step(step)));
        results
    }

    pub fn import_step(&self, definition: &StepDefinition) -> StepResult {
        self.import_step_traced(definition).0
    }

    /// Like [`import_step`](Self::import_step), also returning the stages the
    /// step went through.
    pub fn import_step_traced(&self, definition: &StepDefinition) -> (StepResult, StepLifecycle) {
        let step_type = definition.step_type();
        let mut result = StepResult::success(step_type);
        let mut lifecycle = StepLifecycle::new();

        let Some(processor) = self.registry.get(step_type) else {
            debug!("No importer registered for {}", step_type);
            result.add_error(NO_IMPORTER);
            abort(&mut lifecycle);
            return (result, lifecycle);
        };

        if !processor.handles(step_type) {
            warn!(
                "Importer {} registered for {} declares {}",
                processor.name(),
                step_type,
                processor.step_type()
            );
            result.add_error(INCORRECT_IMPORTER);
            abort(&mut lifecycle);
            return (result, lifecycle);
        }

        let report = self
            .validator
            .validate(&definition.to_document(), &processor.schema());
        if !report.is_valid() {
            result.add_error(report.errors.join("; "));
            abort(&mut lifecycle);
            return (result, lifecycle);
        }
        enter(&mut lifecycle, StepStage::SchemaValidated);

        if !processor.check_capabilities(definition, self.host.actor.as_ref()) {
            result.add_error(INSUFFICIENT_CAPABILITIES);
            abort(&mut lifecycle);
            return (result, lifecycle);
        }
        enter(&mut lifecycle, StepStage::CapabilityChecked);

        self.logger.start_import(step_type, processor.name());
        result.merge(processor.process(definition, &self.host));
        enter(&mut lifecycle, StepStage::Processed);

        self.logger.finish_import(&result);
        enter(&mut lifecycle, StepStage::ResultEmitted);

        (result, lifecycle)
    }
}

fn enter(lifecycle: &mut StepLifecycle, stage: StepStage) {
    if let Err(e) = lifecycle.transition_to(stage) {
        warn!("Step lifecycle out of order: {}", e);
    }
}

fn abort(lifecycle: &mut StepLifecycle) {
    if let Err(e) = lifecycle.short_circuit() {
        warn!("Step lifecycle out of order: {}", e);
    }
}

impl std::fmt::Debug for ImportPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportPipeline")
            .field("host", &self.host)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
