//! Index provisioning and the filtered query view.
//!
//! An index is built once per document identity and persisted under
//! `<storage_dir>/<identity>/`. Later runs asking for reuse load it back (or
//! take it from the in-process cache) instead of re-parsing and re-embedding.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::error::Result;
use crate::pipeline::prompts::format_answer_prompt;
use crate::stores::VectorIndex;
use crate::traits::{embedder::Embedder, generator::Generator, parser::DocumentParser};
use crate::types::{document::DocumentRef, filter::MetadataFilter, request::validate_identity};

/// Builds or reuses the retrieval index for a source document.
pub struct IndexProvisioner {
    parser: Arc<dyn DocumentParser>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    storage_dir: PathBuf,
    guidance: String,
    top_k: usize,
    cache: RwLock<HashMap<String, Arc<VectorIndex>>>,
}

impl IndexProvisioner {
    pub fn new(
        parser: Arc<dyn DocumentParser>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        storage_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            parser,
            embedder,
            generator,
            storage_dir: storage_dir.into(),
            guidance: crate::types::config::DEFAULT_SOURCE_GUIDANCE.to_string(),
            top_k: 5,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Set the parsing guidance used for source documents.
    pub fn with_guidance(mut self, guidance: impl Into<String>) -> Self {
        self.guidance = guidance.into();
        self
    }

    /// Set passages retrieved per query.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Provision an index for `document` and bind a query view to `filter_identities`.
    pub async fn provision(
        &self,
        document: &DocumentRef,
        reuse: bool,
        filter_identities: &[String],
    ) -> Result<QueryEngine> {
        let index = self.index_for(document, reuse).await?;
        let filter = MetadataFilter::for_identities(filter_identities);

        debug!(
            identity = %document.identity,
            segments = index.len(),
            filter = ?filter,
            "Query view ready"
        );

        Ok(QueryEngine {
            index,
            filter,
            embedder: self.embedder.clone(),
            generator: self.generator.clone(),
            top_k: self.top_k,
        })
    }

    /// Load or build the index for `document`.
    pub async fn index_for(&self, document: &DocumentRef, reuse: bool) -> Result<Arc<VectorIndex>> {
        validate_identity(&document.identity)?;

        if reuse {
            if let Some(index) = self.cached(&document.identity) {
                debug!(identity = %document.identity, "Reusing cached index");
                return Ok(index);
            }

            if let Some(index) = VectorIndex::load(&self.storage_dir, &document.identity).await? {
                info!(identity = %document.identity, segments = index.len(), "Loaded persisted index");
                let index = Arc::new(index);
                self.remember(index.clone());
                return Ok(index);
            }

            debug!(identity = %document.identity, "No persisted index, building");
        }

        let index = Arc::new(self.build(document).await?);
        index.persist(&self.storage_dir).await?;
        self.remember(index.clone());
        Ok(index)
    }

    /// Parse, tag, embed.
    async fn build(&self, document: &DocumentRef) -> Result<VectorIndex> {
        let segments: Vec<_> = self
            .parser
            .parse(document, &self.guidance)
            .await?
            .into_iter()
            .filter(|s| !s.text.trim().is_empty())
            .map(|s| s.with_identity(document.identity.clone()))
            .collect();

        let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
        let embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_batch(&texts).await?
        };

        let index = VectorIndex::build(document.identity.clone(), segments, embeddings)?;
        info!(
            identity = %document.identity,
            path = %document.path.display(),
            segments = index.len(),
            "Built index"
        );
        Ok(index)
    }

    fn cached(&self, identity: &str) -> Option<Arc<VectorIndex>> {
        self.cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(identity)
            .cloned()
    }

    fn remember(&self, index: Arc<VectorIndex>) {
        self.cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(index.identity().to_string(), index);
    }
}

/// Retrieval + generation over one index, bound to one filter.
///
/// Shared by every field query of a run.
#[derive(Clone)]
pub struct QueryEngine {
    index: Arc<VectorIndex>,
    filter: MetadataFilter,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    top_k: usize,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("identity", &self.index.identity())
            .field("filter", &self.filter)
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl QueryEngine {
    pub fn filter(&self) -> &MetadataFilter {
        &self.filter
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Answer `question` from the top-k passages passing the filter.
    ///
    /// Returns an empty answer without calling the generator when no passage
    /// passes the filter.
    pub async fn query(&self, question: &str) -> Result<String> {
        let embedding = self.embedder.embed(question).await?;
        let passages = self.index.search(&embedding, &self.filter, self.top_k);
        if passages.is_empty() {
            debug!("No passages matched filter");
            return Ok(String::new());
        }

        let prompt = format_answer_prompt(question, &passages);
        self.generator.complete(&prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormFillError;
    use crate::testing::{MockEmbedder, MockGenerator, MockParser};
    use crate::types::document::Segment;

    fn provisioner(
        parser: Arc<MockParser>,
        generator: Arc<MockGenerator>,
        dir: &std::path::Path,
    ) -> IndexProvisioner {
        IndexProvisioner::new(parser, Arc::new(MockEmbedder::new()), generator, dir)
    }

    fn source_parser() -> Arc<MockParser> {
        Arc::new(MockParser::new().with_document(
            "visa.md",
            vec![
                Segment::new("Full name: Ada Lovelace"),
                Segment::new("   "),
                Segment::new("Nationality: British"),
            ],
        ))
    }

    #[tokio::test]
    async fn test_build_tags_segments_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let parser = source_parser();
        let provisioner = provisioner(parser.clone(), Arc::new(MockGenerator::new()), dir.path());

        let index = provisioner
            .index_for(&DocumentRef::new("visa.md", "visa-1"), true)
            .await
            .unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(parser.parse_count(), 1);
        assert!(VectorIndex::path_for(dir.path(), "visa-1").exists());
    }

    #[tokio::test]
    async fn test_reuse_skips_parser() {
        let dir = tempfile::tempdir().unwrap();
        let doc = DocumentRef::new("visa.md", "visa-1");

        let first = source_parser();
        provisioner(first.clone(), Arc::new(MockGenerator::new()), dir.path())
            .index_for(&doc, true)
            .await
            .unwrap();

        // Fresh provisioner, empty cache: must come from disk
        let second = source_parser();
        let index = provisioner(second.clone(), Arc::new(MockGenerator::new()), dir.path())
            .index_for(&doc, true)
            .await
            .unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(second.parse_count(), 0);
    }

    #[tokio::test]
    async fn test_no_reuse_rebuilds() {
        let dir = tempfile::tempdir().unwrap();
        let doc = DocumentRef::new("visa.md", "visa-1");
        let parser = source_parser();
        let provisioner = provisioner(parser.clone(), Arc::new(MockGenerator::new()), dir.path());

        provisioner.index_for(&doc, true).await.unwrap();
        provisioner.index_for(&doc, false).await.unwrap();

        assert_eq!(parser.parse_count(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_persisted_index_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = VectorIndex::path_for(dir.path(), "visa-1");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "garbage").unwrap();

        let result = provisioner(source_parser(), Arc::new(MockGenerator::new()), dir.path())
            .index_for(&DocumentRef::new("visa.md", "visa-1"), true)
            .await;

        assert!(matches!(result, Err(FormFillError::StorageCorrupt { .. })));
    }

    #[tokio::test]
    async fn test_query_with_foreign_filter_skips_generation() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(MockGenerator::new().with_default_response("should not be used"));
        let engine = provisioner(source_parser(), generator.clone(), dir.path())
            .provision(
                &DocumentRef::new("visa.md", "visa-1"),
                true,
                &["someone-else".to_string()],
            )
            .await
            .unwrap();

        let answer = engine.query("What is the full name?").await.unwrap();
        assert!(answer.is_empty());
        assert!(generator.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_query_passes_passages_to_generator() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(MockGenerator::new().with_default_response("Ada Lovelace"));
        let engine = provisioner(source_parser(), generator.clone(), dir.path())
            .with_top_k(1)
            .provision(&DocumentRef::new("visa.md", "visa-1"), true, &["visa-1".to_string()])
            .await
            .unwrap();

        let answer = engine.query("What is the full name?").await.unwrap();
        assert_eq!(answer, "Ada Lovelace");

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Query: What is the full name?"));
    }
}
