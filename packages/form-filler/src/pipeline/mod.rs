//! The form-filling pipeline.
//!
//! - [`provision`]: build or reuse the source index, bind a filtered query view
//! - [`fields`]: recover the target form's field list and arm the barrier
//! - [`dispatch`]: one retrieval query per field, failures degrade to blank
//! - [`aggregate`]: count-based barrier and the single synthesis call
//! - [`workflow`]: the stage dispatcher tying them together

pub mod aggregate;
pub mod dispatch;
pub mod fields;
pub mod json;
pub mod prompts;
pub mod provision;
pub mod sanitize;
pub mod workflow;

pub use aggregate::{AggregationContext, Collect, ResponseAggregator};
pub use dispatch::QueryDispatcher;
pub use fields::FieldExtractor;
pub use provision::{IndexProvisioner, QueryEngine};
pub use sanitize::{is_missing, sanitize};
pub use workflow::{FormFiller, RunPhase, StageEvent};
