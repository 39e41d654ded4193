//! Configuration for a form-filling pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Parsing guidance for the source document.
pub const DEFAULT_SOURCE_GUIDANCE: &str =
    "Gather related facts together and format them as bullet points with headers.";

/// Parsing guidance for the target form.
pub const DEFAULT_FORM_GUIDANCE: &str =
    "This is an application form. Create a list of all the fields that need to be filled in.";

/// Configuration shared by every run of a [`FormFiller`](crate::FormFiller).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillConfig {
    /// Passages retrieved per field query.
    ///
    /// Default: 5.
    pub top_k: usize,

    /// Root directory for persisted indexes, one subdirectory per identity.
    ///
    /// Default: `./storage`.
    pub storage_dir: PathBuf,

    /// Deadline for a whole run, barrier included.
    ///
    /// Default: 120 seconds.
    pub run_timeout: Duration,

    /// Guidance text handed to the parser for the source document.
    pub source_guidance: String,

    /// Guidance text handed to the parser for the target form.
    pub form_guidance: String,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            storage_dir: PathBuf::from("./storage"),
            run_timeout: Duration::from_secs(120),
            source_guidance: DEFAULT_SOURCE_GUIDANCE.to_string(),
            form_guidance: DEFAULT_FORM_GUIDANCE.to_string(),
        }
    }
}

impl FillConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set passages retrieved per field (clamped to at least 1).
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Set the storage root for persisted indexes.
    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    /// Set the run deadline.
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_source_guidance(mut self, guidance: impl Into<String>) -> Self {
        self.source_guidance = guidance.into();
        self
    }

    pub fn with_form_guidance(mut self, guidance: impl Into<String>) -> Self {
        self.form_guidance = guidance.into();
        self
    }
}
