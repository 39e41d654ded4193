//! Run orchestration: a fixed stage graph driven by one dispatcher loop.
//!
//! ```text
//! Started ─► IndexReady ─► FieldsExtracted ─┬─► FieldAnswered ×N ─► Synthesized
//!   (provision)  (extract + arm barrier)    └─ one task per field
//! ```
//!
//! Every stage is a [`StageEvent`] variant and one dispatcher routes
//! each variant to its handler. Field tasks live on a [`JoinSet`] owned by
//! the run, so they are aborted when the run ends for any reason.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::error::{FormFillError, Result};
use crate::pipeline::{
    aggregate::{AggregationContext, ResponseAggregator},
    dispatch::QueryDispatcher,
    fields::FieldExtractor,
    provision::{IndexProvisioner, QueryEngine},
};
use crate::traits::{embedder::Embedder, generator::Generator, parser::DocumentParser};
use crate::types::{
    answer::{FieldResponse, FillOutcome},
    config::FillConfig,
    document::DocumentRef,
    request::{FillRequest, ValidatedRequest},
};

/// The five stage kinds of a run.
#[derive(Debug)]
pub enum StageEvent {
    /// Request validated, nothing done yet.
    Started,

    /// Query view bound to the run's filter.
    IndexReady(Arc<QueryEngine>),

    /// Field list known, barrier armed.
    FieldsExtracted {
        engine: Arc<QueryEngine>,
        fields: Vec<String>,
    },

    /// One field task finished.
    FieldAnswered(FieldResponse),

    /// Barrier completed and synthesis produced the outcome.
    Synthesized(FillOutcome),
}

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    IndexReady,
    FieldsExtracted,
    Collecting,
    Aggregated,
    Done,
    Failed,
}

/// What the dispatcher loop does after a handler returns.
enum Transition {
    Next(StageEvent),
    Wait,
    Finish(FillOutcome),
}

/// State owned by a single run.
struct Run {
    id: Uuid,
    request: ValidatedRequest,
    context: AggregationContext,
    phase: RunPhase,
    tasks: JoinSet<FieldResponse>,
}

impl Run {
    fn advance(&mut self, next: RunPhase) {
        if self.phase != next {
            debug!(run_id = %self.id, from = ?self.phase, to = ?next, "Run phase");
            self.phase = next;
        }
    }
}

/// Fills forms from a source document.
///
/// Collaborators are injected once and shared by every run; only the index
/// cache inside the provisioner outlives a run.
pub struct FormFiller {
    config: FillConfig,
    provisioner: IndexProvisioner,
    fields: FieldExtractor,
    aggregator: ResponseAggregator,
}

impl FormFiller {
    pub fn new(
        parser: Arc<dyn DocumentParser>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        config: FillConfig,
    ) -> Self {
        let provisioner = IndexProvisioner::new(
            parser.clone(),
            embedder,
            generator.clone(),
            config.storage_dir.clone(),
        )
        .with_guidance(config.source_guidance.clone())
        .with_top_k(config.top_k);
        let fields = FieldExtractor::new(parser, generator.clone())
            .with_guidance(config.form_guidance.clone());
        let aggregator = ResponseAggregator::new(generator);

        Self {
            config,
            provisioner,
            fields,
            aggregator,
        }
    }

    pub fn config(&self) -> &FillConfig {
        &self.config
    }

    pub fn provisioner(&self) -> &IndexProvisioner {
        &self.provisioner
    }

    /// Fill a form, failing with [`FormFillError::Timeout`] after the configured deadline.
    ///
    /// All-or-nothing: a run that does not reach its barrier returns no map.
    pub async fn process(&self, request: FillRequest) -> Result<FillOutcome> {
        let timeout = self.config.run_timeout;
        let started = Instant::now();
        match tokio::time::timeout(timeout, self.run(request)).await {
            Ok(result) => result,
            Err(_) => {
                let elapsed = started.elapsed();
                warn!(?elapsed, "Run timed out");
                Err(FormFillError::Timeout { elapsed })
            }
        }
    }

    /// [`process`](Self::process) that also stops when `cancel` fires.
    pub async fn process_with_cancel(
        &self,
        request: FillRequest,
        cancel: CancellationToken,
    ) -> Result<FillOutcome> {
        tokio::select! {
            result = self.process(request) => result,
            _ = cancel.cancelled() => Err(FormFillError::Cancelled),
        }
    }

    /// One run without a deadline.
    pub async fn run(&self, request: FillRequest) -> Result<FillOutcome> {
        let request = request.validate()?;
        let id = Uuid::new_v4();
        let span = tracing::info_span!("fill_run", run_id = %id, source = %request.source.identity);

        let mut run = Run {
            id,
            context: AggregationContext::new(request.filter_identities.clone()),
            request,
            phase: RunPhase::Init,
            tasks: JoinSet::new(),
        };

        let result = self.drive(&mut run).instrument(span).await;
        match &result {
            Ok(outcome) => {
                run.advance(RunPhase::Done);
                info!(run_id = %id, degraded = outcome.is_degraded(), "Run complete");
            }
            Err(e) => {
                run.advance(RunPhase::Failed);
                warn!(run_id = %id, error = %e, "Run failed");
            }
        }
        result
    }

    /// Feed events to [`handle`](Self::handle) until a handler finishes the run.
    async fn drive(&self, run: &mut Run) -> Result<FillOutcome> {
        let mut queue = VecDeque::from([StageEvent::Started]);

        loop {
            let event = match queue.pop_front() {
                Some(event) => event,
                None => match run.tasks.join_next().await {
                    Some(Ok(response)) => StageEvent::FieldAnswered(response),
                    Some(Err(e)) => {
                        warn!(error = %e, "Field task aborted");
                        continue;
                    }
                    None => {
                        return Err(FormFillError::aggregation(format!(
                            "field tasks exhausted with {} of {:?} responses",
                            run.context.received(),
                            run.context.expected()
                        )))
                    }
                },
            };

            match self.handle(run, event).await? {
                Transition::Next(next) => queue.push_back(next),
                Transition::Wait => {}
                Transition::Finish(outcome) => return Ok(outcome),
            }
        }
    }

    /// Route one stage event to its handler.
    async fn handle(&self, run: &mut Run, event: StageEvent) -> Result<Transition> {
        match event {
            StageEvent::Started => {
                let engine = self
                    .provisioner
                    .provision(
                        &run.request.source,
                        run.request.reuse_index,
                        &run.request.filter_identities,
                    )
                    .await?;
                run.advance(RunPhase::IndexReady);
                Ok(Transition::Next(StageEvent::IndexReady(Arc::new(engine))))
            }

            StageEvent::IndexReady(engine) => {
                let form = DocumentRef::anonymous(run.request.target_form.clone());
                let fields = self.fields.extract(&form, &run.context).await?;
                run.advance(RunPhase::FieldsExtracted);
                Ok(Transition::Next(StageEvent::FieldsExtracted { engine, fields }))
            }

            StageEvent::FieldsExtracted { engine, fields } => {
                QueryDispatcher::new(engine).dispatch(&fields, &mut run.tasks);
                run.advance(RunPhase::Collecting);
                Ok(Transition::Wait)
            }

            StageEvent::FieldAnswered(response) => {
                match self.aggregator.on_response(&run.context, response).await? {
                    Some(outcome) => {
                        run.advance(RunPhase::Aggregated);
                        Ok(Transition::Next(StageEvent::Synthesized(outcome)))
                    }
                    None => Ok(Transition::Wait),
                }
            }

            StageEvent::Synthesized(outcome) => {
                run.tasks.abort_all();
                Ok(Transition::Finish(outcome))
            }
        }
    }
}
