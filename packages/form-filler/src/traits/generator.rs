//! Text-generation service.

use async_trait::async_trait;

use crate::error::Result;

/// Completes a prompt with free-form text.
///
/// Nothing guarantees the completion is valid JSON even when the prompt asks
/// for it; callers go through [`crate::pipeline::json`] to recover structure.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}
