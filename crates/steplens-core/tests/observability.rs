//! Observability tests for the question lifecycle.
//!
//! Each test runs the emitter under `#[traced_test]` and checks the captured
//! output for the structured fields.

use std::time::Duration;

use steplens_core::{
    emit_batch_finished, emit_question_failed, emit_question_finished, emit_question_started,
    emit_throttle_retry, question_span, METRICS,
};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn question_started_logs_type_and_session() {
    emit_question_started("q-1", "RAG", "session-9");
    assert!(logs_contain("question.started"));
    assert!(logs_contain("session-9"));
}

#[traced_test]
#[test]
fn throttle_retry_logs_wait() {
    emit_throttle_retry("invoke_agent", 2, 3, Duration::from_secs(60));
    assert!(logs_contain("remote.throttled"));
    assert!(logs_contain("wait_secs=60"));
}

#[traced_test]
#[test]
fn question_failed_logs_stage() {
    emit_question_failed("q-2", "Evaluation", &"judge reply is not valid JSON");
    assert!(logs_contain("question.failed"));
    assert!(logs_contain("Evaluation"));
}

#[traced_test]
#[test]
fn question_finished_and_batch_finished() {
    emit_question_finished("q-3", 1200, 4, 8);
    emit_batch_finished(3, 2, 1, false);
    assert!(logs_contain("question.finished"));
    assert!(logs_contain("batch.finished"));
}

#[traced_test]
#[test]
fn question_span_scopes_events() {
    {
        let _span = question_span("q-span", "trace-abc").entered();
        emit_question_started("q-span", "COT", "s");
    }
    assert!(logs_contain("trace-abc"));
}

#[traced_test]
#[test]
fn metrics_flush_emits_counters() {
    METRICS.flush();
    assert!(logs_contain("judge_calls"));
}
