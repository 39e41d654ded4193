//! In-process vector index with JSON persistence.
//!
//! Holds every embedded segment of one document identity. Retrieval is a
//! brute-force cosine scan over the segments passing the metadata filter,
//! which is plenty for single documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::error::{FormFillError, Result};
use crate::types::{
    document::{Passage, Segment},
    filter::MetadataFilter,
};

/// Schema version written into `index.json`.
pub const INDEX_SCHEMA_VERSION: u32 = 1;

/// File name of a persisted index inside its identity directory.
pub const INDEX_FILE: &str = "index.json";

/// A segment together with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedSegment {
    #[serde(flatten)]
    pub segment: Segment,
    pub embedding: Vec<f32>,
}

/// On-disk form of a [`VectorIndex`].
#[derive(Debug, Serialize, Deserialize)]
struct PersistedIndex {
    version: u32,
    identity: String,
    built_at: DateTime<Utc>,
    segments: Vec<IndexedSegment>,
}

/// Embedded segments of one document identity.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    identity: String,
    built_at: DateTime<Utc>,
    segments: Vec<IndexedSegment>,
}

impl VectorIndex {
    /// Build from segments and their embeddings (same order, same length).
    pub fn build(
        identity: impl Into<String>,
        segments: Vec<Segment>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if segments.len() != embeddings.len() {
            return Err(FormFillError::Embedding(
                format!(
                    "embedding count {} does not match segment count {}",
                    embeddings.len(),
                    segments.len()
                )
                .into(),
            ));
        }

        Ok(Self {
            identity: identity.into(),
            built_at: Utc::now(),
            segments: segments
                .into_iter()
                .zip(embeddings)
                .map(|(segment, embedding)| IndexedSegment { segment, embedding })
                .collect(),
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Location of the persisted index for an identity under `storage_dir`.
    pub fn path_for(storage_dir: &Path, identity: &str) -> PathBuf {
        storage_dir.join(identity).join(INDEX_FILE)
    }

    /// Rank segments passing `filter` by similarity to `embedding`.
    ///
    /// Returns at most `top_k` passages, highest score first.
    pub fn search(&self, embedding: &[f32], filter: &MetadataFilter, top_k: usize) -> Vec<Passage> {
        let mut scored: Vec<Passage> = self
            .segments
            .iter()
            .filter(|s| filter.matches(&s.segment.metadata))
            .map(|s| Passage {
                text: s.segment.text.clone(),
                identity: s.segment.identity().map(str::to_string),
                score: cosine_similarity(embedding, &s.embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        scored
    }

    /// Write this index to `<storage_dir>/<identity>/index.json`.
    pub async fn persist(&self, storage_dir: &Path) -> Result<PathBuf> {
        let path = Self::path_for(storage_dir, &self.identity);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| FormFillError::Storage(Box::new(e)))?;
        }

        let persisted = PersistedIndex {
            version: INDEX_SCHEMA_VERSION,
            identity: self.identity.clone(),
            built_at: self.built_at,
            segments: self.segments.clone(),
        };
        let bytes =
            serde_json::to_vec(&persisted).map_err(|e| FormFillError::Storage(Box::new(e)))?;

        // index.json is only ever replaced whole; each writer stages its own file
        let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| FormFillError::Storage(Box::new(e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| FormFillError::Storage(Box::new(e)))?;

        debug!(path = %path.display(), segments = self.segments.len(), "Index persisted");
        Ok(path)
    }

    /// Load the persisted index for `identity`.
    ///
    /// `Ok(None)` when nothing was persisted for it. Unreadable or
    /// schema-incompatible data is [`FormFillError::StorageCorrupt`].
    pub async fn load(storage_dir: &Path, identity: &str) -> Result<Option<Self>> {
        let path = Self::path_for(storage_dir, identity);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(FormFillError::StorageCorrupt {
                    path,
                    reason: e.to_string(),
                })
            }
        };

        let persisted: PersistedIndex =
            serde_json::from_slice(&bytes).map_err(|e| FormFillError::StorageCorrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        if persisted.version != INDEX_SCHEMA_VERSION {
            return Err(FormFillError::StorageCorrupt {
                path,
                reason: format!(
                    "unsupported schema version {} (expected {})",
                    persisted.version, INDEX_SCHEMA_VERSION
                ),
            });
        }
        if persisted.identity != identity {
            return Err(FormFillError::StorageCorrupt {
                path,
                reason: format!(
                    "index belongs to identity {:?}, not {:?}",
                    persisted.identity, identity
                ),
            });
        }

        Ok(Some(Self {
            identity: persisted.identity,
            built_at: persisted.built_at,
            segments: persisted.segments,
        }))
    }
}

/// Cosine similarity of two vectors (0.0 for mismatched or zero vectors).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
