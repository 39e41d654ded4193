//! Model service adapters.
//!
//! Reference implementations of [`Generator`](crate::Generator) and
//! [`Embedder`](crate::Embedder). Applications can use these directly or
//! implement the traits themselves.

mod openai;

pub use openai::OpenAI;
