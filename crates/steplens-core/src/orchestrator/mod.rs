//! Evaluation orchestrator.
//!
//! Drives each question through [`QuestionState`] strictly one at a time.
//! Every failure except operator cancellation is contained to its question:
//! the run trace is rewritten as an error record and the batch moves on.

pub mod cancel;
pub mod lifecycle;
pub mod reporting;

use std::sync::Arc;

use serde_json::{Map, Value};
use steplens_remote::{AgentRuntime, JudgeModel, TelemetrySink};
use tokio::time::Instant;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use crate::config::HarnessConfig;
use crate::descriptor::fetch_descriptor;
use crate::domain::{trace_digest, AgentDescriptor, BatchInput, EvalError, EvaluationRecord, QuestionRecord, Result};
use crate::evaluator::{self, EvaluationContext, EvaluationKind};
use crate::invoker::AgentInvoker;
use crate::metrics::METRICS;
use crate::obs;
use crate::reducer::TraceReducer;
use crate::report::BatchSummary;
use crate::summarize::summarize;

pub use cancel::CancelSignal;
pub use lifecycle::{QuestionLifecycle, QuestionState, STAGE_AGENT_PROCESSING, STAGE_CANCELLED, STAGE_EVALUATION};
pub use reporting::RunReporter;

/// Result of one contained question.
#[derive(Debug, Clone, PartialEq)]
pub enum QuestionOutcome {
    Evaluated(EvaluationRecord),
    Failed {
        trace_id: String,
        stage: &'static str,
        error: String,
    },
}

impl QuestionOutcome {
    pub fn trace_id(&self) -> &str {
        match self {
            QuestionOutcome::Evaluated(record) => &record.trace_id,
            QuestionOutcome::Failed { trace_id, .. } => trace_id,
        }
    }

    pub fn record(&self) -> Option<&EvaluationRecord> {
        match self {
            QuestionOutcome::Evaluated(record) => Some(record),
            QuestionOutcome::Failed { .. } => None,
        }
    }
}

pub struct Orchestrator {
    judge: Arc<dyn JudgeModel>,
    sink: Arc<dyn TelemetrySink>,
    config: HarnessConfig,
    descriptor: AgentDescriptor,
    reducer: TraceReducer,
    invoker: AgentInvoker,
    cancel: CancelSignal,
}

impl Orchestrator {
    /// Validate `config`, fetch the agent descriptor and build the orchestrator.
    pub async fn connect(
        runtime: Arc<dyn AgentRuntime>,
        judge: Arc<dyn JudgeModel>,
        sink: Arc<dyn TelemetrySink>,
        config: HarnessConfig,
        cancel: CancelSignal,
    ) -> Result<Self> {
        config.validate()?;
        let descriptor =
            fetch_descriptor(runtime.as_ref(), &config.agent.agent_id, &config.agent.alias_id).await?;
        Ok(Self::new(runtime, judge, sink, config, descriptor, cancel))
    }

    pub fn new(
        runtime: Arc<dyn AgentRuntime>,
        judge: Arc<dyn JudgeModel>,
        sink: Arc<dyn TelemetrySink>,
        config: HarnessConfig,
        descriptor: AgentDescriptor,
        cancel: CancelSignal,
    ) -> Self {
        let reducer = TraceReducer::new(config.reducer.clone());
        let invoker = AgentInvoker::new(runtime, config.agent.clone(), config.retry);
        Self {
            judge,
            sink,
            config,
            descriptor,
            reducer,
            invoker,
            cancel,
        }
    }

    pub fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Evaluate one question. Only cancellation surfaces as `Err`.
    pub async fn evaluate_question(&self, question: &QuestionRecord, session_id: &str) -> Result<QuestionOutcome> {
        let trace_id = Uuid::new_v4().to_string();
        let span = obs::question_span(&question.question_id, &trace_id);
        self.evaluate_traced(question, session_id, trace_id).instrument(span).await
    }

    async fn evaluate_traced(&self, question: &QuestionRecord, session_id: &str, trace_id: String) -> Result<QuestionOutcome> {
        let started = Instant::now();
        METRICS.inc_questions_attempted();
        obs::emit_question_started(&question.question_id, &question.question_type, session_id);

        let reporter = RunReporter::new(self.sink.as_ref(), &trace_id, session_id, self.config.pacing.span_delay());
        let mut lifecycle = QuestionLifecycle::new(&question.question_id);

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.pipeline(question, session_id, &reporter, &mut lifecycle) => Some(result),
        };

        match result {
            Some(Ok((record, steps))) => {
                METRICS.inc_questions_succeeded();
                obs::emit_question_finished(
                    &question.question_id,
                    started.elapsed().as_millis() as u64,
                    steps,
                    record.metrics.0.len() + record.cot_verdict.0.len(),
                );
                Ok(QuestionOutcome::Evaluated(record))
            }
            Some(Err(err)) => {
                debug!(question_id = %question.question_id, path = ?lifecycle.history(), "question failed");
                let stage = lifecycle.fail().unwrap_or(STAGE_EVALUATION);
                self.record_failure(&reporter, question, stage, &err).await;
                Ok(QuestionOutcome::Failed {
                    trace_id,
                    stage,
                    error: err.to_string(),
                })
            }
            None => {
                let _ = lifecycle.fail();
                self.record_failure(&reporter, question, STAGE_CANCELLED, &EvalError::Cancelled)
                    .await;
                Err(EvalError::Cancelled)
            }
        }
    }

    async fn record_failure(&self, reporter: &RunReporter<'_>, question: &QuestionRecord, stage: &str, err: &EvalError) {
        METRICS.inc_questions_failed();
        obs::emit_question_failed(&question.question_id, stage, err);
        if let Err(sink_err) = reporter.report_error(question, stage, err).await {
            warn!(question_id = %question.question_id, error = %sink_err, "failed to write error record");
        }
        if let Err(sink_err) = reporter.flush().await {
            warn!(question_id = %question.question_id, error = %sink_err, "failed to flush sink");
        }
    }

    /// The happy path. Returns the record and the number of reasoning steps.
    async fn pipeline(
        &self,
        question: &QuestionRecord,
        session_id: &str,
        reporter: &RunReporter<'_>,
        lifecycle: &mut QuestionLifecycle,
    ) -> Result<(EvaluationRecord, usize)> {
        reporter.create_run_trace(question, &self.descriptor).await?;
        let kind = EvaluationKind::from_tag(&question.question_type, &self.config.evaluators)?;

        lifecycle.advance(QuestionState::Invoking)?;
        let invocation = self.invoker.invoke(&question.question, session_id).await?;

        lifecycle.advance(QuestionState::Invoked)?;
        if invocation.answer.trim().is_empty() {
            return Err(EvalError::NoAnswerReceived);
        }
        let steps = self.reducer.reduce(&invocation.fragments);
        let digest = trace_digest(&steps)?;
        reporter
            .update_after_invocation(question, &self.config.judge, &digest, &invocation.answer)
            .await?;

        lifecycle.advance(QuestionState::Summarizing)?;
        let summary = summarize(&steps, &self.config.query.extraction);

        lifecycle.advance(QuestionState::Judging)?;
        let ctx = EvaluationContext {
            question,
            answer: &invocation.answer,
            summary: &summary,
            descriptor: &self.descriptor,
            judge: &self.config.judge,
            query: &self.config.query,
        };
        let judgement = evaluator::evaluate(kind, &ctx, self.judge.as_ref(), &self.config.retry).await?;

        lifecycle.advance(QuestionState::Reporting)?;
        let mut metadata = match &invocation.response_metadata {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => Map::from_iter([("response".to_string(), other.clone())]),
        };
        metadata.extend(evaluator::artifacts(kind, &summary));
        reporter
            .report_agent_generation(
                &self.descriptor,
                question,
                self.config.judge.temperature,
                invocation.started_at,
                Value::Object(metadata),
                &invocation.answer,
                invocation.usage,
            )
            .await?;
        reporter
            .report_cot(question, &judgement, &self.config.judge.cot_model_id, &steps)
            .await?;
        if kind.scores_run_trace() {
            reporter
                .report_run_scores(&question.question_type, &judgement.metrics)
                .await?;
        }
        reporter.flush().await?;

        lifecycle.advance(QuestionState::Done)?;
        let record = EvaluationRecord {
            question_id: question.question_id.clone(),
            question: question.question.clone(),
            question_type: question.question_type.clone(),
            ground_truth: question.ground_truth.clone(),
            answer: invocation.answer,
            usage: invocation.usage,
            metrics: judgement.metrics,
            cot_verdict: judgement.cot,
            trace_id: reporter.trace_id().to_string(),
            session_id: session_id.to_string(),
            trace_digest: digest,
        };
        Ok((record, steps.len()))
    }

    /// Evaluate every question of `batch` in document order.
    ///
    /// Each trajectory gets a fresh session id. The configured cooldown runs
    /// between questions. Cancellation halts the batch with
    /// [`EvalError::Cancelled`].
    pub async fn run_batch(&self, batch: &BatchInput) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();
        let total = batch.question_count();
        let mut done = 0usize;

        for (trajectory, questions) in &batch.trajectories {
            let session_id = Uuid::new_v4().to_string();
            for question in questions {
                let outcome = match self.evaluate_question(question, &session_id).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        Self::finish(&summary, true);
                        return Err(err);
                    }
                };
                match outcome {
                    QuestionOutcome::Evaluated(record) => summary.record_success(trajectory, record),
                    QuestionOutcome::Failed { trace_id, stage, error } => summary.record_failure(
                        trajectory,
                        &question.question_id,
                        &question.question_type,
                        &trace_id,
                        stage,
                        &error,
                    ),
                }

                done += 1;
                if done < total && !self.cooldown().await {
                    Self::finish(&summary, true);
                    return Err(EvalError::Cancelled);
                }
            }
        }

        Self::finish(&summary, false);
        Ok(summary)
    }

    /// Sleep out the cooldown. `false` if cancelled meanwhile.
    async fn cooldown(&self) -> bool {
        let wait = self.config.pacing.cooldown();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(wait) => true,
        }
    }

    fn finish(summary: &BatchSummary, cancelled: bool) {
        METRICS.flush();
        obs::emit_batch_finished(summary.attempted, summary.succeeded, summary.failed, cancelled);
    }
}
