//! Retrieval-backed form filling.
//!
//! Given a source document (an applicant's records) and a target form, the
//! library works out which fields the form asks for, answers each one from
//! the source by retrieval, and merges the answers into one field → answer
//! map with a final synthesis call.
//!
//! # Flow
//!
//! 1. Provision a vector index for the source document, reusing a persisted
//!    one when asked, and bind a query view filtered to the run's identities.
//! 2. Extract the form's field list. Its length `N` arms a barrier.
//! 3. Fan out one retrieval query per field. A failing or empty query yields
//!    the blank sentinel, never an error.
//! 4. When exactly `N` responses have arrived, synthesize the final map.
//!
//! # Usage
//!
//! ```rust,ignore
//! use form_filler::{ai::OpenAI, parsers::TextFileParser, DocumentRef, FillConfig, FillRequest, FormFiller};
//!
//! let ai = Arc::new(OpenAI::new("sk-..."));
//! let filler = FormFiller::new(Arc::new(TextFileParser::new()), ai.clone(), ai, FillConfig::default());
//!
//! let outcome = filler
//!     .process(FillRequest::new(DocumentRef::new("visa.md", "applicant-1"), "form.md"))
//!     .await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator interfaces (DocumentParser, Embedder, Generator)
//! - [`types`] - Requests, answers, filters and configuration
//! - [`pipeline`] - Provisioning, field extraction, fan-out, barrier, synthesis
//! - [`stores`] - The persisted vector index
//! - [`ai`] - OpenAI-compatible adapter
//! - [`parsers`] - Local text/markdown parser
//! - [`testing`] - Mock implementations for testing

pub mod ai;
pub mod error;
pub mod parsers;
pub mod pipeline;
pub mod security;
pub mod settings;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{FormFillError, JsonRecoveryError, Result};
pub use pipeline::{FormFiller, RunPhase, StageEvent};
pub use settings::Settings;
pub use stores::VectorIndex;
pub use traits::{embedder::Embedder, generator::Generator, parser::DocumentParser};
pub use types::{
    answer::{Answer, FieldQuery, FieldResponse, FillOutcome, FilledForm, SENTINEL},
    config::FillConfig,
    document::{DocumentRef, Passage, Segment},
    filter::MetadataFilter,
    request::{FillRequest, ValidatedRequest},
};

pub use tokio_util::sync::CancellationToken;
