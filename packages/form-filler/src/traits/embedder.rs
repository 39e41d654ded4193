//! Embedding service.

use async_trait::async_trait;

use crate::error::Result;

/// Maps text to a vector for semantic similarity search.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for many texts, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }
}
