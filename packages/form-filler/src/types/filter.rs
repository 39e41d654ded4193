//! Metadata filters restricting retrieval to a set of document identities.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::document::IDENTITY_KEY;

/// Filter applied to indexed segments before ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetadataFilter {
    /// Every segment matches.
    Unrestricted,

    /// `key == value`.
    Exact { key: String, value: String },

    /// `key == v1 OR key == v2 OR ...`.
    AnyOf { key: String, values: Vec<String> },
}

impl Default for MetadataFilter {
    fn default() -> Self {
        Self::Unrestricted
    }
}

impl MetadataFilter {
    /// Build the filter for a set of identities.
    ///
    /// One identity gives a single term, several give an OR-combination,
    /// none leaves retrieval unrestricted.
    pub fn for_identities(identities: &[String]) -> Self {
        match identities {
            [] => Self::Unrestricted,
            [only] => Self::Exact {
                key: IDENTITY_KEY.to_string(),
                value: only.clone(),
            },
            many => Self::AnyOf {
                key: IDENTITY_KEY.to_string(),
                values: many.to_vec(),
            },
        }
    }

    /// Check whether segment metadata passes this filter.
    pub fn matches(&self, metadata: &BTreeMap<String, String>) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Exact { key, value } => metadata.get(key) == Some(value),
            Self::AnyOf { key, values } => metadata
                .get(key)
                .map(|v| values.iter().any(|candidate| candidate == v))
                .unwrap_or(false),
        }
    }

    /// Whether the filter spans more than one identity.
    pub fn spans_multiple(&self) -> bool {
        matches!(self, Self::AnyOf { values, .. } if values.len() > 1)
    }
}
