//! Storage implementations.

pub mod vector;

pub use vector::{cosine_similarity, IndexedSegment, VectorIndex, INDEX_FILE, INDEX_SCHEMA_VERSION};
