//! Field queries, field responses and the final answer map.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wire form of [`Answer::Blank`].
///
/// Renders as an empty form entry. Callers must keep the field and show it
/// blank, never drop it.
pub const SENTINEL: &str = "";

/// An answer to one form field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Answer {
    /// Concrete text found in the source document.
    Value(String),

    /// The field was searched for and nothing usable was found.
    Blank,
}

impl Answer {
    pub fn value(text: impl Into<String>) -> Self {
        Self::Value(text.into())
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Blank)
    }

    /// Text to place in the form (the sentinel for blanks).
    pub fn as_str(&self) -> &str {
        match self {
            Self::Value(text) => text,
            Self::Blank => SENTINEL,
        }
    }
}

impl std::fmt::Display for Answer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Answer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Answer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(if text == SENTINEL {
            Self::Blank
        } else {
            Self::Value(text)
        })
    }
}

/// A question generated for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldQuery {
    pub field: String,
    pub question: String,
}

/// The answer produced for one field by its retrieval query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldResponse {
    pub field: String,
    pub answer: Answer,
}

impl FieldResponse {
    pub fn new(field: impl Into<String>, answer: Answer) -> Self {
        Self {
            field: field.into(),
            answer,
        }
    }

    pub fn blank(field: impl Into<String>) -> Self {
        Self::new(field, Answer::Blank)
    }
}

/// The completed field → answer map, in form order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilledForm {
    answers: IndexMap<String, Answer>,
}

impl FilledForm {
    pub fn new(answers: IndexMap<String, Answer>) -> Self {
        Self { answers }
    }

    pub fn get(&self, field: &str) -> Option<&Answer> {
        self.answers.get(field)
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Answer)> {
        self.answers.iter()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.answers.keys().map(String::as_str)
    }

    /// Number of fields with concrete answers.
    pub fn answered(&self) -> usize {
        self.answers.values().filter(|a| !a.is_blank()).count()
    }

    pub fn into_inner(self) -> IndexMap<String, Answer> {
        self.answers
    }
}

/// What a completed run hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillOutcome {
    /// Every field answered or explicitly blank.
    Filled(FilledForm),

    /// Synthesis output could not be structured; the raw model text.
    Unstructured { raw: String },
}

impl FillOutcome {
    pub fn as_filled(&self) -> Option<&FilledForm> {
        match self {
            Self::Filled(form) => Some(form),
            Self::Unstructured { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Unstructured { .. })
    }
}
