//! Fan-in: the field barrier and answer synthesis.
//!
//! [`AggregationContext`] is the only shared mutable state of a run. Field
//! tasks finish in any order; each response is recorded under the context's
//! mutex and exactly one recording observes the Nth distinct field, so
//! synthesis fires exactly once.
//!
//! Duplicate policy: overwrite-and-count-once. A repeated response for a
//! field replaces the stored answer without advancing the count.

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{FormFillError, Result};
use crate::pipeline::{json::extract_json, prompts::format_synthesis_prompt, sanitize::sanitize};
use crate::traits::generator::Generator;
use crate::types::answer::{Answer, FieldResponse, FillOutcome, FilledForm};

/// Result of recording one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collect {
    /// Still waiting on other fields.
    Pending { received: usize, expected: usize },

    /// This response completed the barrier; every response in field order.
    Ready(Vec<FieldResponse>),

    /// The barrier already fired; the response was ignored.
    Closed,
}

#[derive(Debug, Default)]
struct BarrierState {
    fields: Option<Vec<String>>,
    responses: IndexMap<String, Answer>,
    completed: bool,
}

/// Per-run barrier state.
///
/// Created at run start, dropped at run end. Never shared across runs.
#[derive(Debug)]
pub struct AggregationContext {
    filter_identities: Vec<String>,
    state: Mutex<BarrierState>,
}

impl AggregationContext {
    pub fn new(filter_identities: Vec<String>) -> Self {
        Self {
            filter_identities,
            state: Mutex::new(BarrierState::default()),
        }
    }

    pub fn filter_identities(&self) -> &[String] {
        &self.filter_identities
    }

    /// Fix the expected field set. Must happen before any dispatch.
    ///
    /// Returns N, the number of responses the barrier waits for.
    pub fn arm(&self, fields: &[String]) -> Result<usize> {
        let mut state = self.lock();
        if state.fields.is_some() {
            return Err(FormFillError::aggregation("barrier already armed"));
        }
        if fields.is_empty() {
            return Err(FormFillError::aggregation("cannot arm barrier with zero fields"));
        }

        let mut distinct: Vec<String> = Vec::with_capacity(fields.len());
        for field in fields {
            if !distinct.contains(field) {
                distinct.push(field.clone());
            }
        }
        let expected = distinct.len();
        state.fields = Some(distinct);
        debug!(expected, "Barrier armed");
        Ok(expected)
    }

    /// N, once armed.
    pub fn expected(&self) -> Option<usize> {
        self.lock().fields.as_ref().map(Vec::len)
    }

    pub fn received(&self) -> usize {
        self.lock().responses.len()
    }

    pub fn is_complete(&self) -> bool {
        self.lock().completed
    }

    /// Record a field response.
    ///
    /// Insert and count check happen under one lock acquisition.
    pub fn record(&self, response: FieldResponse) -> Result<Collect> {
        let mut state = self.lock();

        let Some(fields) = state.fields.as_ref() else {
            return Err(FormFillError::aggregation(format!(
                "response for {:?} arrived before the barrier was armed",
                response.field
            )));
        };
        let expected = fields.len();

        if state.completed {
            warn!(field = %response.field, "Response after barrier completed, ignored");
            return Ok(Collect::Closed);
        }

        if !fields.contains(&response.field) {
            return Err(FormFillError::aggregation(format!(
                "response for unexpected field {:?}",
                response.field
            )));
        }

        if let Some(previous) = state
            .responses
            .insert(response.field.clone(), response.answer)
        {
            debug!(field = %response.field, previous = %previous, "Duplicate response overwrote earlier answer");
        }

        let received = state.responses.len();
        if received < expected {
            return Ok(Collect::Pending { received, expected });
        }

        state.completed = true;
        let ordered = state
            .fields
            .iter()
            .flatten()
            .filter_map(|field| {
                state
                    .responses
                    .get(field)
                    .map(|answer| FieldResponse::new(field.clone(), answer.clone()))
            })
            .collect();
        Ok(Collect::Ready(ordered))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BarrierState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Merges the collected field responses into the final answer map.
pub struct ResponseAggregator {
    generator: Arc<dyn Generator>,
}

impl ResponseAggregator {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Record `response`; synthesize once the barrier completes.
    ///
    /// `Ok(None)` while the barrier is still waiting (or already fired).
    pub async fn on_response(
        &self,
        context: &AggregationContext,
        response: FieldResponse,
    ) -> Result<Option<FillOutcome>> {
        match context.record(response)? {
            Collect::Pending { received, expected } => {
                debug!(received, expected, "Waiting for field responses");
                Ok(None)
            }
            Collect::Closed => Ok(None),
            Collect::Ready(responses) => {
                info!(fields = responses.len(), "All field responses collected");
                self.synthesize(context.filter_identities(), &responses)
                    .await
                    .map(Some)
            }
        }
    }

    /// One generation call over every (field, response) pair.
    ///
    /// Unparsable output degrades to [`FillOutcome::Unstructured`].
    pub async fn synthesize(
        &self,
        filter_identities: &[String],
        responses: &[FieldResponse],
    ) -> Result<FillOutcome> {
        let prompt = format_synthesis_prompt(filter_identities, responses);
        let raw = self.generator.complete(&prompt).await?;

        let object = match extract_json(&raw) {
            Ok(Value::Object(object)) => object,
            Ok(other) => {
                warn!(kind = json_kind(&other), "Synthesis output is not a JSON object, returning raw text");
                return Ok(FillOutcome::Unstructured { raw });
            }
            Err(e) => {
                warn!(error = %e, "Synthesis output unparsable, returning raw text");
                return Ok(FillOutcome::Unstructured { raw });
            }
        };

        let mut answers = IndexMap::with_capacity(responses.len());
        for response in responses {
            let answer = match object.get(&response.field) {
                Some(value) => render_value(value),
                None => {
                    warn!(field = %response.field, "Synthesis omitted field, using collected response");
                    response.answer.clone()
                }
            };
            answers.insert(response.field.clone(), answer);
        }

        let dropped = object
            .keys()
            .filter(|key| !answers.contains_key(key.as_str()))
            .count();
        if dropped > 0 {
            warn!(dropped, "Synthesis invented fields, dropped");
        }

        let form = FilledForm::new(answers);
        info!(
            fields = form.len(),
            answered = form.answered(),
            "Synthesis complete"
        );
        Ok(FillOutcome::Filled(form))
    }
}

/// Render one synthesized JSON value as a sanitized answer.
fn render_value(value: &Value) -> Answer {
    match value {
        Value::Null => Answer::Blank,
        Value::String(s) => sanitize(s),
        Value::Bool(_) | Value::Number(_) => sanitize(&value.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|item| match render_value(item) {
                    Answer::Value(text) => Some(text),
                    Answer::Blank => None,
                })
                .collect();
            sanitize(&parts.join(", "))
        }
        Value::Object(_) => sanitize(&value.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
