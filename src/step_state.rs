//! Per-step lifecycle state machine.
//!
//! Every step handled by the import pipeline moves through a fixed sequence of
//! stages. A failure at any stage short-circuits straight to `ResultEmitted`,
//! so a step that fails schema validation or the capability check can never
//! reach `Processed`.
//!
//! ```text
//! Registered
//!     ↓
//! SchemaValidated
//!     ↓
//! CapabilityChecked
//!     ↓
//! Processed
//!     ↓
//! ResultEmitted
//!
//! (Any non-terminal stage can short-circuit to ResultEmitted)
//! ```

use std::fmt;
use thiserror::Error;

/// Lifecycle stages of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StepStage {
    /// A processor was resolved for the step type
    Registered = 0,

    /// The definition satisfied the processor's JSON Schema
    SchemaValidated = 1,

    /// The actor holds every capability the processor requires
    CapabilityChecked = 2,

    /// `process()` ran exactly once
    Processed = 3,

    /// The result was handed to the caller (terminal)
    ResultEmitted = 4,
}

impl StepStage {
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::ResultEmitted)
    }

    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Registered => Some(Self::SchemaValidated),
            Self::SchemaValidated => Some(Self::CapabilityChecked),
            Self::CapabilityChecked => Some(Self::Processed),
            Self::Processed => Some(Self::ResultEmitted),
            Self::ResultEmitted => None,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::SchemaValidated => "schema validated",
            Self::CapabilityChecked => "capability checked",
            Self::Processed => "processed",
            Self::ResultEmitted => "result emitted",
        }
    }

    pub const fn all_stages() -> &'static [Self] {
        &[
            Self::Registered,
            Self::SchemaValidated,
            Self::CapabilityChecked,
            Self::Processed,
            Self::ResultEmitted,
        ]
    }
}

impl fmt::Display for StepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during stage transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepTransitionError {
    #[error("Cannot skip from {from} to {to}")]
    SkippedStage { from: StepStage, to: StepStage },

    #[error("Cannot go backwards from {from} to {to}")]
    BackwardTransition { from: StepStage, to: StepStage },

    #[error("Step already finished ({from})")]
    FromTerminalState { from: StepStage },
}

/// Tracks where one step is in its lifecycle.
#[derive(Debug, Clone)]
pub struct StepLifecycle {
    current: StepStage,
    short_circuited_at: Option<StepStage>,
    history: Vec<StepStage>,
}

impl Default for StepLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl StepLifecycle {
    pub fn new() -> Self {
        Self {
            current: StepStage::Registered,
            short_circuited_at: None,
            history: vec![StepStage::Registered],
        }
    }

    #[inline]
    pub fn current_stage(&self) -> StepStage {
        self.current
    }

    /// Stage at which the step was aborted, if it was.
    #[inline]
    pub fn short_circuited_at(&self) -> Option<StepStage> {
        self.short_circuited_at
    }

    pub fn history(&self) -> &[StepStage] {
        &self.history
    }

    /// True once `process()` has been reached.
    pub fn was_processed(&self) -> bool {
        self.history.contains(&StepStage::Processed)
    }

    /// Advance to the next stage in sequence.
    pub fn advance(&mut self) -> Result<StepStage, StepTransitionError> {
        let next = self
            .current
            .next()
            .ok_or(StepTransitionError::FromTerminalState { from: self.current })?;
        self.record(next);
        Ok(next)
    }

    /// Move to `target`, which must be the immediate next stage.
    pub fn transition_to(&mut self, target: StepStage) -> Result<StepStage, StepTransitionError> {
        if self.current.is_terminal() {
            return Err(StepTransitionError::FromTerminalState { from: self.current });
        }
        if target.order() <= self.current.order() {
            return Err(StepTransitionError::BackwardTransition {
                from: self.current,
                to: target,
            });
        }
        if self.current.next() != Some(target) {
            return Err(StepTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }
        self.record(target);
        Ok(target)
    }

    /// Abort the step: jump straight to `ResultEmitted`.
    pub fn short_circuit(&mut self) -> Result<(), StepTransitionError> {
        if self.current.is_terminal() {
            return Err(StepTransitionError::FromTerminalState { from: self.current });
        }
        self.short_circuited_at = Some(self.current);
        self.record(StepStage::ResultEmitted);
        Ok(())
    }

    fn record(&mut self, stage: StepStage) {
        self.history.push(stage);
        self.current = stage;
    }
}
