//! Fan-out: one retrieval query per field.
//!
//! Every field gets its own task on a [`JoinSet`]; no task waits on a
//! sibling. A failing query never fails the run. Errors, panics and
//! "no information" answers all become [`Answer::Blank`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::pipeline::{prompts::format_field_question, provision::QueryEngine, sanitize::sanitize};
use crate::types::answer::{Answer, FieldQuery, FieldResponse};

/// Spawns field queries against one query view.
#[derive(Clone)]
pub struct QueryDispatcher {
    engine: Arc<QueryEngine>,
}

impl QueryDispatcher {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }

    /// One question per field.
    ///
    /// Phrasing depends on whether the filter spans several identities.
    pub fn questions(&self, fields: &[String]) -> Vec<FieldQuery> {
        let multiple = self.engine.filter().spans_multiple();
        fields
            .iter()
            .map(|field| FieldQuery {
                field: field.clone(),
                question: format_field_question(field, multiple),
            })
            .collect()
    }

    /// Start one task per field on `tasks`.
    ///
    /// Responses come back through [`JoinSet::join_next`] in completion order.
    pub fn dispatch(&self, fields: &[String], tasks: &mut JoinSet<FieldResponse>) {
        for query in self.questions(fields) {
            let dispatcher = self.clone();
            tasks.spawn(async move { dispatcher.answer(query).await });
        }
        debug!(tasks = fields.len(), "Field queries dispatched");
    }

    /// Run one field query, degrading every failure to the sentinel.
    pub async fn answer(&self, query: FieldQuery) -> FieldResponse {
        let outcome = AssertUnwindSafe(self.engine.query(&query.question))
            .catch_unwind()
            .await;

        let answer = match outcome {
            Ok(Ok(text)) => {
                let answer = sanitize(&text);
                if answer.is_blank() {
                    debug!(field = %query.field, "No information found");
                }
                answer
            }
            Ok(Err(e)) => {
                warn!(field = %query.field, error = %e, "Field query failed, leaving blank");
                Answer::Blank
            }
            Err(_) => {
                warn!(field = %query.field, "Field query panicked, leaving blank");
                Answer::Blank
            }
        };

        FieldResponse::new(query.field, answer)
    }
}
