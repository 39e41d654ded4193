//! Local plain-text and markdown parser.
//!
//! Splits a file into sections at markdown headings, then packs each
//! section's paragraphs into segments of at most `max_segment_chars`. A
//! paragraph longer than the limit becomes a segment on its own.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{FormFillError, Result};
use crate::traits::parser::DocumentParser;
use crate::types::document::{DocumentRef, Segment};

/// Metadata key holding the file name a segment came from.
pub const FILE_NAME_KEY: &str = "file_name";

/// Metadata key holding the heading a segment sits under.
pub const HEADING_KEY: &str = "heading";

/// Parser for UTF-8 text files. Ignores guidance.
#[derive(Debug, Clone)]
pub struct TextFileParser {
    max_segment_chars: usize,
}

impl Default for TextFileParser {
    fn default() -> Self {
        Self {
            max_segment_chars: 1500,
        }
    }
}

impl TextFileParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the segment size limit in characters (clamped to at least 1).
    pub fn with_max_segment_chars(mut self, max: usize) -> Self {
        self.max_segment_chars = max.max(1);
        self
    }

    /// Split already-loaded text into segments.
    pub fn split(&self, text: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        for (heading, body) in sections(text) {
            for chunk in pack(&paragraphs(&body), self.max_segment_chars) {
                let text = match &heading {
                    Some(h) => format!("{}\n{}", h, chunk),
                    None => chunk,
                };
                let mut segment = Segment::new(text);
                if let Some(h) = &heading {
                    segment
                        .metadata
                        .insert(HEADING_KEY.to_string(), h.trim_start_matches('#').trim().to_string());
                }
                segments.push(segment);
            }
        }
        segments
    }
}

#[async_trait]
impl DocumentParser for TextFileParser {
    async fn parse(&self, document: &DocumentRef, _guidance: &str) -> Result<Vec<Segment>> {
        let text = tokio::fs::read_to_string(&document.path)
            .await
            .map_err(|e| FormFillError::Parse(Box::new(e)))?;

        let file_name = document
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let segments: Vec<Segment> = self
            .split(&text)
            .into_iter()
            .map(|mut s| {
                s.metadata.insert(FILE_NAME_KEY.to_string(), file_name.clone());
                s
            })
            .collect();

        debug!(path = %document.path.display(), segments = segments.len(), "Parsed text file");
        Ok(segments)
    }
}

/// Group lines under their nearest preceding markdown heading.
fn sections(text: &str) -> Vec<(Option<String>, String)> {
    let mut out: Vec<(Option<String>, String)> = Vec::new();
    let mut heading: Option<String> = None;
    let mut body = String::new();

    for line in text.lines() {
        if line.trim_start().starts_with('#') {
            if heading.is_some() || !body.trim().is_empty() {
                out.push((heading.take(), std::mem::take(&mut body)));
            }
            heading = Some(line.trim().to_string());
        } else {
            body.push_str(line);
            body.push('\n');
        }
    }
    if heading.is_some() || !body.trim().is_empty() {
        out.push((heading, body));
    }
    out
}

/// Blank-line separated paragraphs, trimmed, empties dropped.
fn paragraphs(body: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = Vec::new();
    for line in body.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        out.push(current.join("\n"));
    }
    out
}

/// Greedily pack paragraphs into chunks no longer than `max` characters.
fn pack(paragraphs: &[String], max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for p in paragraphs {
        let joined = current.chars().count() + 2 + p.chars().count();
        if !current.is_empty() && joined > max {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(p);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "# Applicant\nName: Ada Lovelace\n\nBorn: 1815\n\n## Employment\nAnalyst at Babbage & Co.\n";

    #[test]
    fn test_split_by_heading() {
        let segments = TextFileParser::new().split(DOC);

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "# Applicant\nName: Ada Lovelace\n\nBorn: 1815");
        assert_eq!(segments[0].metadata.get(HEADING_KEY).unwrap(), "Applicant");
        assert!(segments[1].text.contains("Babbage"));
    }

    #[test]
    fn test_split_respects_size_limit() {
        let segments = TextFileParser::new()
            .with_max_segment_chars(20)
            .split("first paragraph\n\nsecond paragraph\n\nthird");

        assert_eq!(segments.len(), 3);
        assert_eq!(segments[2].text, "third");
    }

    #[test]
    fn test_blank_and_plain_documents() {
        assert!(TextFileParser::new().split("\n\n   \n").is_empty());
        assert_eq!(TextFileParser::new().split("plain text").len(), 1);
    }

    #[tokio::test]
    async fn test_parse_file_tags_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visa.md");
        std::fs::write(&path, DOC).unwrap();

        let segments = TextFileParser::new()
            .parse(&DocumentRef::anonymous(&path), "ignored")
            .await
            .unwrap();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].metadata.get(FILE_NAME_KEY).unwrap(), "visa.md");
    }

    #[tokio::test]
    async fn test_missing_file_is_parse_error() {
        let result = TextFileParser::new()
            .parse(&DocumentRef::anonymous("/nonexistent/visa.md"), "")
            .await;
        assert!(matches!(result, Err(FormFillError::Parse(_))));
    }
}
