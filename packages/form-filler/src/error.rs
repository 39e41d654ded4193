//! Typed errors for the form filler.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can match
//! on the failure class of a run.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that abort a form-filling run.
///
/// Per-field query failures never appear here: the dispatcher absorbs them
/// into the sentinel answer.
#[derive(Debug, Error)]
pub enum FormFillError {
    /// A required document reference is missing or unusable
    #[error("invalid input: {reason}")]
    InputValidation { reason: String },

    /// Persisted index exists but cannot be read back
    #[error("persisted index at {} is unreadable: {reason}", path.display())]
    StorageCorrupt { path: PathBuf, reason: String },

    /// Persisting an index failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// No field list could be recovered from the target form
    #[error("field extraction failed: {reason}")]
    FieldExtraction {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Document parsing service failed
    #[error("parse service error: {0}")]
    Parse(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Embedding service failed
    #[error("embedding error: {0}")]
    Embedding(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Generation service failed
    #[error("generation error: {0}")]
    Generation(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Barrier contract violated
    #[error("aggregation error: {reason}")]
    Aggregation { reason: String },

    /// Run did not finish before its deadline
    #[error("run timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// Run was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration error
    #[error("config error: {0}")]
    Config(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl FormFillError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InputValidation {
            reason: reason.into(),
        }
    }

    pub fn aggregation(reason: impl Into<String>) -> Self {
        Self::Aggregation {
            reason: reason.into(),
        }
    }

    pub fn field_extraction(reason: impl Into<String>) -> Self {
        Self::FieldExtraction {
            reason: reason.into(),
            source: None,
        }
    }
}

/// Model output could not be turned into JSON, even by salvage.
#[derive(Debug, Clone, Error)]
#[error("no JSON recoverable from model output: {reason}")]
pub struct JsonRecoveryError {
    pub reason: String,
}

impl JsonRecoveryError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<JsonRecoveryError> for FormFillError {
    fn from(err: JsonRecoveryError) -> Self {
        FormFillError::FieldExtraction {
            reason: err.reason.clone(),
            source: Some(Box::new(err)),
        }
    }
}

/// Result type alias for form-filling operations.
pub type Result<T> = std::result::Result<T, FormFillError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_recovery_becomes_field_extraction() {
        let err: FormFillError = JsonRecoveryError::new("empty output").into();
        match err {
            FormFillError::FieldExtraction { reason, source } => {
                assert_eq!(reason, "empty output");
                assert!(source.is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_storage_corrupt_message_names_path() {
        let err = FormFillError::StorageCorrupt {
            path: PathBuf::from("storage/visa-1/index.json"),
            reason: "unsupported schema version 7".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("storage/visa-1/index.json"));
        assert!(msg.contains("version 7"));
    }
}
