//! Missing-information detection.
//!
//! Models rarely answer "nothing found" with silence. They write prose like
//! "The document does not contain a passport number". Any answer matching
//! one of these phrases is replaced by [`Answer::Blank`].
//!
//! This is a substring heuristic. A genuine answer that happens to contain a
//! listed phrase is blanked, and a novel negative phrasing slips through.
//!
//! "None", "NA" and "null" are answers, not placeholders: "Previous visa
//! refusals: None" is a real negative that must reach the form.

use crate::types::answer::Answer;

/// Phrases that mark an answer as "looked, found nothing" (lowercase).
pub const NEGATION_PHRASES: &[&str] = &[
    "not available",
    "no information",
    "no relevant information",
    "not enough information",
    "insufficient information",
    "cannot find",
    "can't find",
    "could not find",
    "couldn't find",
    "unable to find",
    "unable to determine",
    "cannot be determined",
    "does not contain",
    "doesn't contain",
    "do not contain",
    "not contained",
    "not mentioned",
    "is not mentioned",
    "no mention",
    "not provided",
    "not specified",
    "not stated",
    "not found",
    "no data",
    "not included",
    "does not provide",
    "doesn't provide",
    "does not specify",
    "doesn't specify",
    "does not mention",
    "doesn't mention",
];

/// Whole answers that are placeholders rather than content (lowercase).
const PLACEHOLDERS: &[&str] = &["n/a", "unknown", "-", "--", "empty response"];

/// Whether `text` reads as "no information".
pub fn is_missing(text: &str) -> bool {
    let normalized = text.trim().trim_end_matches('.').trim().to_lowercase();
    if normalized.is_empty() {
        return true;
    }
    if PLACEHOLDERS.contains(&normalized.as_str()) {
        return true;
    }
    NEGATION_PHRASES
        .iter()
        .any(|phrase| normalized.contains(phrase))
}

/// Turn raw answer text into an [`Answer`], blanking negative answers.
pub fn sanitize(text: &str) -> Answer {
    if is_missing(text) {
        Answer::Blank
    } else {
        Answer::Value(text.trim().to_string())
    }
}
