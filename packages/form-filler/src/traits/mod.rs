//! Interfaces to the external services the pipeline orchestrates.
//!
//! Applications implement these to plug in a document parser, an embedding
//! model and a text-generation model.

pub mod embedder;
pub mod generator;
pub mod parser;
