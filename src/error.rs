//! Error handling module for Blueprint
//!
//! Provides the crate-wide error taxonomy using thiserror. Pipelines return
//! these for unit-level aborts (a whole export, a transport request); per-step
//! import failures are reported through `StepResult` instead.

use thiserror::Error;

/// Main error type for Blueprint
#[derive(Error, Debug)]
pub enum BlueprintError {
    /// IO errors (config files, local site state)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed input: landing page, schema document, unsupported resource type
    #[error("Validation error: {0}")]
    Validation(String),

    /// Actor lacks a capability required by an exporter or processor
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// No processor, exporter or session registered under the given key
    #[error("Not found: {0}")]
    NotFound(String),

    /// Import session bookkeeping errors
    #[error("Session error: {0}")]
    Session(String),

    /// Import payload exceeds the configured limit
    #[error("Payload of {size} bytes exceeds the maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Imports are only accepted in setup mode or with an explicit override
    #[error("Import is not allowed: {0}")]
    ImportNotAllowed(String),
}

/// Result type alias for Blueprint operations
pub type Result<T> = std::result::Result<T, BlueprintError>;

// Convenient error constructors
impl BlueprintError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an authorization error
    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a session error
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Create an import-not-allowed error
    pub fn import_not_allowed(msg: impl Into<String>) -> Self {
        Self::ImportNotAllowed(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BlueprintError::validation("landing page must be root-relative");
        assert_eq!(
            err.to_string(),
            "Validation error: landing page must be root-relative"
        );

        let err = BlueprintError::PayloadTooLarge { size: 10, max: 5 };
        assert_eq!(
            err.to_string(),
            "Payload of 10 bytes exceeds the maximum of 5 bytes"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: BlueprintError = io_err.into();
        assert!(matches!(err, BlueprintError::Io(_)));
    }

    #[test]
    fn test_error_constructors() {
        let err = BlueprintError::authorization("exporter denied");
        assert!(matches!(err, BlueprintError::Authorization(_)));

        let err = BlueprintError::not_found("session abc");
        assert!(matches!(err, BlueprintError::NotFound(_)));
    }
}
