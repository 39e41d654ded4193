//! Document parsing service.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::document::{DocumentRef, Segment};

/// Turns a document into text segments.
///
/// `guidance` is a natural-language hint about what the document is and how
/// its content should be grouped. Implementations may ignore it.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, document: &DocumentRef, guidance: &str) -> Result<Vec<Segment>>;
}
