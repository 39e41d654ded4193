//! OpenAI-compatible chat and embedding client.
//!
//! # Example
//!
//! ```rust,ignore
//! use form_filler::ai::OpenAI;
//!
//! let ai = Arc::new(OpenAI::new("sk-...").with_model("gpt-4o-mini"));
//! let filler = FormFiller::new(parser, ai.clone(), ai, FillConfig::default());
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FormFillError, Result};
use crate::security::{ExposeSecret, SecretString};
use crate::traits::{embedder::Embedder, generator::Generator};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str = "You are a careful assistant that fills in application forms. \
Answer only from the information you are given.";

/// OpenAI-based generator and embedder.
#[derive(Clone)]
pub struct OpenAI {
    client: Client,
    api_key: SecretString,
    model: String,
    embedding_model: String,
    base_url: String,
    temperature: f32,
}

impl std::fmt::Debug for OpenAI {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAI")
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl OpenAI {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: SecretString::from(api_key.into()),
            model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.3,
        }
    }

    /// Set the chat model (default: gpt-4o-mini).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the embedding model (default: text-embedding-3-small).
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Set a custom base URL (proxies, local servers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the sampling temperature (default: 0.3).
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn chat(&self, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: Some(self.temperature),
            max_tokens: Some(4096),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| FormFillError::Generation(Box::new(e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(FormFillError::Generation(
                format!("OpenAI API error ({}): {}", status, error_text).into(),
            ));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| FormFillError::Generation(Box::new(e)))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| FormFillError::Generation("No response from OpenAI".into()))
    }

    async fn embeddings(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let expected = input.len();
        let request = EmbeddingRequest {
            model: self.embedding_model.clone(),
            input,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| FormFillError::Embedding(Box::new(e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(FormFillError::Embedding(
                format!("OpenAI embedding error ({}): {}", status, error_text).into(),
            ));
        }

        let mut embed_response: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| FormFillError::Embedding(Box::new(e)))?;

        // The API may return items out of order; `index` is authoritative
        embed_response.data.sort_by_key(|d| d.index);
        if embed_response.data.len() != expected {
            return Err(FormFillError::Embedding(
                format!(
                    "expected {} embeddings, got {}",
                    expected,
                    embed_response.data.len()
                )
                .into(),
            ));
        }
        Ok(embed_response.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Generator for OpenAI {
    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.model, chars = prompt.len(), "Chat completion");
        self.chat(prompt).await
    }
}

#[async_trait]
impl Embedder for OpenAI {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embeddings(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| FormFillError::Embedding("No embedding from OpenAI".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(EMBEDDING_BATCH) {
            let input = chunk.iter().map(|t| t.to_string()).collect();
            results.extend(self.embeddings(input).await?);
        }
        debug!(count = results.len(), model = %self.embedding_model, "Embedded batch");
        Ok(results)
    }
}

/// Inputs per embeddings request.
const EMBEDDING_BATCH: usize = 256;

// Request/Response types

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_builder() {
        let ai = OpenAI::new("sk-test")
            .with_model("gpt-4o")
            .with_embedding_model("text-embedding-3-large")
            .with_base_url("https://custom.api.com/v1/")
            .with_temperature(0.0);

        assert_eq!(ai.model, "gpt-4o");
        assert_eq!(ai.embedding_model, "text-embedding-3-large");
        assert_eq!(ai.base_url, "https://custom.api.com/v1");
        assert_eq!(ai.temperature, 0.0);
        assert!(!format!("{:?}", ai).contains("sk-test"));
    }

    #[test]
    fn test_embedding_response_reordered_by_index() {
        let mut response: EmbeddingResponse = serde_json::from_str(
            r#"{"data": [{"index": 1, "embedding": [2.0]}, {"index": 0, "embedding": [1.0]}]}"#,
        )
        .unwrap();
        response.data.sort_by_key(|d| d.index);
        assert_eq!(response.data[0].embedding, vec![1.0]);
    }
}
