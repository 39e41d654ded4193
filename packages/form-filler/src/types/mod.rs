//! Data types for the form filler.

pub mod answer;
pub mod config;
pub mod document;
pub mod filter;
pub mod request;
