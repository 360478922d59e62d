//! Resumable imports.
//!
//! A transport hands over a schema document once, receives an opaque token
//! and then asks for one step at a time. The gate in front of it enforces the
//! payload limit and only lets imports through on sites in setup mode or with
//! an explicit override.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::BlueprintConfig;
use crate::error::{BlueprintError, Result};
use crate::import::{IMPORT_SCHEMA_STEP, ImportPipeline};
use crate::result::StepResult;
use crate::step::BlueprintSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportGate {
    max_payload_bytes: usize,
    setup_mode: bool,
    allow_override: bool,
}

impl ImportGate {
    pub fn new(max_payload_bytes: usize, setup_mode: bool, allow_override: bool) -> Self {
        Self {
            max_payload_bytes,
            setup_mode,
            allow_override,
        }
    }

    /// Gate from configuration. `BLUEPRINT_ALLOW_IMPORT=1` counts as an override.
    pub fn from_config(config: &BlueprintConfig) -> Self {
        Self::new(
            config.max_payload_bytes,
            config.setup_mode,
            config.allow_import_override || BlueprintConfig::env_allows_import(),
        )
    }

    pub fn check(&self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_payload_bytes {
            return Err(BlueprintError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload_bytes,
            });
        }
        if !self.setup_mode && !self.allow_override {
            return Err(BlueprintError::import_not_allowed(
                "the site is not in setup mode and no override is set",
            ));
        }
        Ok(())
    }
}

/// Outcome of one `advance` call.
#[derive(Debug, Clone, Serialize)]
pub struct SessionProgress {
    pub result: StepResult,
    /// Steps imported so far in this session.
    pub completed: usize,
    pub remaining: usize,
    pub done: bool,
}

#[derive(Debug)]
struct ImportSession {
    schema: BlueprintSchema,
    next: usize,
}

#[derive(Debug)]
pub struct SessionStore {
    gate: ImportGate,
    sessions: Mutex<HashMap<String, ImportSession>>,
}

impl SessionStore {
    pub fn new(gate: ImportGate) -> Self {
        Self {
            gate,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Check and parse a schema document and start a session for it.
    pub fn open(&self, payload: &str) -> Result<String> {
        self.gate.check(payload.as_bytes())?;
        let schema = BlueprintSchema::from_json(payload)?;

        let token = Uuid::new_v4().to_string();
        info!(
            "Opened import session {} with {} steps",
            token,
            schema.steps.len()
        );
        self.lock()?
            .insert(token.clone(), ImportSession { schema, next: 0 });
        Ok(token)
    }

    /// Import the next step of a session. The session is dropped once its
    /// last step has run. An empty schema completes on the first call with
    /// the `ImportSchema` result.
    pub fn advance(&self, token: &str, pipeline: &ImportPipeline) -> Result<SessionProgress> {
        let mut session = self
            .lock()?
            .remove(token)
            .ok_or_else(|| BlueprintError::not_found(format!("import session {}", token)))?;

        let total = session.schema.steps.len();
        let result = match session.schema.steps.get(session.next) {
            Some(step) => pipeline.import_step(step),
            None => StepResult::success(IMPORT_SCHEMA_STEP),
        };
        session.next = (session.next + 1).min(total);

        let progress = SessionProgress {
            result,
            completed: session.next,
            remaining: total - session.next,
            done: session.next == total,
        };

        if progress.done {
            info!("Import session {} finished", token);
        } else {
            debug!("Import session {}: {} steps remaining", token, progress.remaining);
            self.lock()?.insert(token.to_string(), session);
        }
        Ok(progress)
    }

    /// Steps left in a session, `None` for unknown or finished sessions.
    pub fn remaining(&self, token: &str) -> Option<usize> {
        let sessions = self.sessions.lock().ok()?;
        sessions
            .get(token)
            .map(|s| s.schema.steps.len() - s.next)
    }

    /// Abandon a session. Returns whether it existed.
    pub fn close(&self, token: &str) -> Result<bool> {
        Ok(self.lock()?.remove(token).is_some())
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, ImportSession>>> {
        self.sessions
            .lock()
            .map_err(|_| BlueprintError::session("session table lock poisoned"))
    }
}
