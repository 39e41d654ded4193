//! Document references, parsed segments and retrieved passages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Metadata key carrying the identity of the document a segment came from.
pub const IDENTITY_KEY: &str = "source_id";

/// Identity used when the caller does not name the source document.
pub const DEFAULT_IDENTITY: &str = "default";

/// A caller-owned reference to a document on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Location of the document
    pub path: PathBuf,

    /// Identity used to tag indexed content and key persisted indexes
    pub identity: String,
}

impl DocumentRef {
    pub fn new(path: impl Into<PathBuf>, identity: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            identity: identity.into(),
        }
    }

    /// Reference a document under the default identity.
    pub fn anonymous(path: impl Into<PathBuf>) -> Self {
        Self::new(path, DEFAULT_IDENTITY)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A unit of parsed text, as returned by the parsing service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Segment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Tag this segment with the identity of its owning document.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.metadata.insert(IDENTITY_KEY.to_string(), identity.into());
        self
    }

    pub fn identity(&self) -> Option<&str> {
        self.metadata.get(IDENTITY_KEY).map(String::as_str)
    }
}

/// A segment returned from retrieval, with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub text: String,
    pub identity: Option<String>,
    pub score: f32,
}
