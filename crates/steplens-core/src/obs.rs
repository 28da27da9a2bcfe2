//! Structured observability hooks for the question lifecycle.
//!
//! - `question_span`: question-scoped span for `Instrument`-ing async work
//! - `emit_*`: one structured event per lifecycle milestone
//!
//! Lifecycle events go out at `info!`; contained failures and throttling at
//! `warn!`.

use std::time::Duration;

use tracing::{info, warn};

/// Span carrying `question_id` and `trace_id` for one evaluation.
///
/// ```ignore
/// evaluate(question).instrument(question_span("q-7", "3f1c...")).await
/// ```
pub fn question_span(question_id: &str, trace_id: &str) -> tracing::Span {
    tracing::info_span!("steplens.question", question_id = %question_id, trace_id = %trace_id)
}

pub fn emit_question_started(question_id: &str, question_type: &str, session_id: &str) {
    info!(
        event = "question.started",
        question_id = %question_id,
        question_type = %question_type,
        session_id = %session_id,
    );
}

pub fn emit_state_transition(question_id: &str, from: &str, to: &str) {
    tracing::debug!(event = "question.transition", question_id = %question_id, from = %from, to = %to);
}

/// Emit event: throttled call about to be retried (warning level).
pub fn emit_throttle_retry(label: &str, attempt: u32, max_retries: u32, wait: Duration) {
    warn!(
        event = "remote.throttled",
        call = %label,
        attempt = attempt,
        max_retries = max_retries,
        wait_secs = wait.as_secs(),
    );
}

/// Emit event: question abandoned (warning level).
pub fn emit_question_failed(question_id: &str, stage: &str, error: &dyn std::fmt::Display) {
    warn!(event = "question.failed", question_id = %question_id, stage = %stage, error = %error);
}

pub fn emit_question_finished(question_id: &str, duration_ms: u64, steps: usize, metrics: usize) {
    info!(
        event = "question.finished",
        question_id = %question_id,
        duration_ms = duration_ms,
        steps = steps,
        metrics = metrics,
    );
}

pub fn emit_batch_finished(attempted: usize, succeeded: usize, failed: usize, cancelled: bool) {
    info!(
        event = "batch.finished",
        attempted = attempted,
        succeeded = succeeded,
        failed = failed,
        cancelled = cancelled,
    );
}
