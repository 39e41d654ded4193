//! Testing utilities including mock implementations.
//!
//! These let applications exercise the whole pipeline without a real parser
//! or model behind it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{FormFillError, Result};
use crate::traits::{embedder::Embedder, generator::Generator, parser::DocumentParser};
use crate::types::document::{DocumentRef, Segment};

/// What a [`MockGenerator`] rule does when its pattern matches.
#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Slow(String, Duration),
    Fail(String),
    Panic,
}

/// A mock text generator.
///
/// Rules are matched against the prompt by substring, in the order they were
/// added; the first match wins. Prompts that match nothing get the default
/// response (empty unless set).
#[derive(Default)]
pub struct MockGenerator {
    /// (pattern, reply) in insertion order
    rules: Arc<RwLock<Vec<(String, Reply)>>>,

    /// Reply when no rule matches
    default_response: String,

    /// Artificial latency per call
    delay: Option<Duration>,

    /// Every prompt received, for assertions
    prompts: Arc<RwLock<Vec<String>>>,

    /// Calls that ran to completion, delays included
    completed: Arc<AtomicUsize>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `response` when no rule matches.
    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = response.into();
        self
    }

    /// Reply with `response` to prompts containing `pattern`.
    pub fn with_response(self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.push_rule(pattern, Reply::Text(response.into()))
    }

    /// Reply with `response` to prompts containing `pattern`, after `delay`.
    pub fn with_slow_response(
        self,
        pattern: impl Into<String>,
        response: impl Into<String>,
        delay: Duration,
    ) -> Self {
        self.push_rule(pattern, Reply::Slow(response.into(), delay))
    }

    /// Fail with a generation error on prompts containing `pattern`.
    pub fn failing_on(self, pattern: impl Into<String>, message: impl Into<String>) -> Self {
        self.push_rule(pattern, Reply::Fail(message.into()))
    }

    /// Panic on prompts containing `pattern`.
    pub fn panicking_on(self, pattern: impl Into<String>) -> Self {
        self.push_rule(pattern, Reply::Panic)
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// All prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.read().unwrap().clone()
    }

    /// Calls that returned, as opposed to calls that were dropped mid-flight.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Prompts received so far that contain `pattern`.
    pub fn prompts_containing(&self, pattern: &str) -> usize {
        self.prompts
            .read()
            .unwrap()
            .iter()
            .filter(|p| p.contains(pattern))
            .count()
    }

    fn push_rule(self, pattern: impl Into<String>, reply: Reply) -> Self {
        self.rules.write().unwrap().push((pattern.into(), reply));
        self
    }

    fn reply_for(&self, prompt: &str) -> Reply {
        self.rules
            .read()
            .unwrap()
            .iter()
            .find(|(pattern, _)| prompt.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Reply::Text(self.default_response.clone()))
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.write().unwrap().push(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        // Locks are released before this point so a panic cannot poison them
        let reply = self.reply_for(prompt);
        if let Reply::Slow(_, delay) = &reply {
            tokio::time::sleep(*delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        match reply {
            Reply::Text(text) | Reply::Slow(text, _) => Ok(text),
            Reply::Fail(message) => Err(FormFillError::Generation(message.into())),
            Reply::Panic => panic!("mock generator told to panic"),
        }
    }
}

/// A mock embedder producing deterministic vectors from a SHA-256 of the text.
pub struct MockEmbedder {
    embedding_dim: usize,

    /// Predefined embeddings by text
    embeddings: Arc<RwLock<HashMap<String, Vec<f32>>>>,

    /// Texts embedded, for assertions
    calls: Arc<RwLock<Vec<String>>>,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            embedding_dim: 64,
            embeddings: Default::default(),
            calls: Default::default(),
        }
    }

    /// Set the embedding dimension.
    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    /// Add a predefined embedding for text.
    pub fn with_embedding(self, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        self.embeddings
            .write()
            .unwrap()
            .insert(text.into(), embedding);
        self
    }

    /// Number of texts embedded so far.
    pub fn embed_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    fn deterministic_embedding(&self, text: &str) -> Vec<f32> {
        use sha2::{Digest, Sha256};

        let hash = Sha256::digest(text.as_bytes());
        (0..self.embedding_dim)
            .map(|i| (hash[i % 32] as f32 / 127.5) - 1.0)
            .collect()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.write().unwrap().push(text.to_string());

        Ok(self
            .embeddings
            .read()
            .unwrap()
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.deterministic_embedding(text)))
    }
}

/// A mock parser serving predefined segments by path.
///
/// Unknown paths fail with a parse error, like a missing file would.
#[derive(Default)]
pub struct MockParser {
    documents: Arc<RwLock<HashMap<PathBuf, Vec<Segment>>>>,

    /// Paths parsed, for assertions
    calls: Arc<RwLock<Vec<PathBuf>>>,
}

impl MockParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `segments` for `path`.
    pub fn with_document(self, path: impl Into<PathBuf>, segments: Vec<Segment>) -> Self {
        self.documents
            .write()
            .unwrap()
            .insert(path.into(), segments);
        self
    }

    /// Serve one segment per text for `path`.
    pub fn with_text(self, path: impl Into<PathBuf>, texts: &[&str]) -> Self {
        let segments = texts.iter().map(|t| Segment::new(*t)).collect();
        self.with_document(path, segments)
    }

    /// Number of parse calls so far.
    pub fn parse_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Paths parsed so far, in call order.
    pub fn parsed_paths(&self) -> Vec<PathBuf> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl DocumentParser for MockParser {
    async fn parse(&self, document: &DocumentRef, _guidance: &str) -> Result<Vec<Segment>> {
        self.calls.write().unwrap().push(document.path.clone());

        self.documents
            .read()
            .unwrap()
            .get(&document.path)
            .cloned()
            .ok_or_else(|| {
                FormFillError::Parse(Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("mock has no document at {}", document.path.display()),
                )))
            })
    }
}
