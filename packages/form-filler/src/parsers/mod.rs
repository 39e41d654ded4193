//! Document parser implementations.

pub mod text;

pub use text::TextFileParser;
