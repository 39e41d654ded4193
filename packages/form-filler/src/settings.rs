//! Settings loaded from the environment.

use std::path::PathBuf;
use std::time::Duration;

use dotenvy::dotenv;

use crate::error::{FormFillError, Result};
use crate::ai::OpenAI;
use crate::security::{ExposeSecret, SecretString};
use crate::types::config::FillConfig;

/// Environment-backed settings for the binary and the OpenAI adapter.
#[derive(Debug, Clone)]
pub struct Settings {
    pub openai_api_key: Option<SecretString>,
    pub openai_base_url: Option<String>,
    pub model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub storage_dir: Option<PathBuf>,
    pub top_k: Option<usize>,
    pub timeout: Option<Duration>,
}

impl Settings {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            openai_api_key: get("OPENAI_API_KEY").map(SecretString::from),
            openai_base_url: get("OPENAI_BASE_URL"),
            model: get("FORM_FILLER_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            embedding_model: get("FORM_FILLER_EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            temperature: parse(&get, "FORM_FILLER_TEMPERATURE")?.unwrap_or(0.3),
            storage_dir: get("FORM_FILLER_STORAGE_DIR").map(PathBuf::from),
            top_k: parse(&get, "FORM_FILLER_TOP_K")?,
            timeout: parse::<u64>(&get, "FORM_FILLER_TIMEOUT_SECS")?.map(Duration::from_secs),
        })
    }

    /// The OpenAI adapter these settings describe. Fails when no key is configured.
    pub fn openai(&self) -> Result<OpenAI> {
        let key = self
            .openai_api_key
            .as_ref()
            .ok_or_else(|| FormFillError::Config("OPENAI_API_KEY must be set".into()))?;

        let mut ai = OpenAI::new(key.expose_secret())
            .with_model(&self.model)
            .with_embedding_model(&self.embedding_model)
            .with_temperature(self.temperature);
        if let Some(url) = &self.openai_base_url {
            ai = ai.with_base_url(url);
        }
        Ok(ai)
    }

    /// Layer these settings over the defaults.
    pub fn fill_config(&self) -> FillConfig {
        let mut config = FillConfig::default();
        if let Some(dir) = &self.storage_dir {
            config = config.with_storage_dir(dir);
        }
        if let Some(top_k) = self.top_k {
            config = config.with_top_k(top_k);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_run_timeout(timeout);
        }
        config
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| {
                FormFillError::Config(format!("{} must be a valid number: {}", key, e).into())
            })
        })
        .transpose()
}
