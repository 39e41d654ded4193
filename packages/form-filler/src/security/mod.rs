//! Credential handling.
//!
//! API keys are [`SecretString`]s: redacted in `Debug` and only readable
//! through [`ExposeSecret::expose_secret`] where a request is authorized.

pub use secrecy::{ExposeSecret, SecretString};
