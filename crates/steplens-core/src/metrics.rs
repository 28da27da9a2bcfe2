//! Global atomic counters for steplens.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (the orchestrator does so at batch end).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    questions_attempted: AtomicU64,
    questions_succeeded: AtomicU64,
    questions_failed: AtomicU64,
    throttle_retries: AtomicU64,
    spans_emitted: AtomicU64,
    judge_calls: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            questions_attempted: AtomicU64::new(0),
            questions_succeeded: AtomicU64::new(0),
            questions_failed: AtomicU64::new(0),
            throttle_retries: AtomicU64::new(0),
            spans_emitted: AtomicU64::new(0),
            judge_calls: AtomicU64::new(0),
        }
    }

    fn bump(counter: &AtomicU64, name: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = name, "counter incremented");
    }

    pub fn inc_questions_attempted(&self) {
        Self::bump(&self.questions_attempted, "questions_attempted");
    }

    pub fn inc_questions_succeeded(&self) {
        Self::bump(&self.questions_succeeded, "questions_succeeded");
    }

    pub fn inc_questions_failed(&self) {
        Self::bump(&self.questions_failed, "questions_failed");
    }

    pub fn inc_throttle_retries(&self) {
        Self::bump(&self.throttle_retries, "throttle_retries");
    }

    pub fn inc_spans_emitted(&self) {
        Self::bump(&self.spans_emitted, "spans_emitted");
    }

    pub fn inc_judge_calls(&self) {
        Self::bump(&self.judge_calls, "judge_calls");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            questions_attempted = self.questions_attempted(),
            questions_succeeded = self.questions_succeeded(),
            questions_failed = self.questions_failed(),
            throttle_retries = self.throttle_retries(),
            spans_emitted = self.spans_emitted(),
            judge_calls = self.judge_calls(),
        );
    }

    pub fn questions_attempted(&self) -> u64 {
        self.questions_attempted.load(Ordering::Relaxed)
    }

    pub fn questions_succeeded(&self) -> u64 {
        self.questions_succeeded.load(Ordering::Relaxed)
    }

    pub fn questions_failed(&self) -> u64 {
        self.questions_failed.load(Ordering::Relaxed)
    }

    pub fn throttle_retries(&self) -> u64 {
        self.throttle_retries.load(Ordering::Relaxed)
    }

    pub fn spans_emitted(&self) -> u64 {
        self.spans_emitted.load(Ordering::Relaxed)
    }

    pub fn judge_calls(&self) -> u64 {
        self.judge_calls.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.questions_attempted,
            &self.questions_succeeded,
            &self.questions_failed,
            &self.throttle_retries,
            &self.spans_emitted,
            &self.judge_calls,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_questions_attempted();
        m.inc_questions_attempted();
        m.inc_questions_failed();
        m.inc_spans_emitted();
        m.inc_spans_emitted();
        m.inc_spans_emitted();
        assert_eq!(m.questions_attempted(), 2);
        assert_eq!(m.questions_failed(), 1);
        assert_eq!(m.spans_emitted(), 3);
        assert_eq!(m.judge_calls(), 0);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_questions_succeeded();
        m.inc_throttle_retries();
        m.inc_judge_calls();
        m.reset();
        assert_eq!(m.questions_succeeded(), 0);
        assert_eq!(m.throttle_retries(), 0);
        assert_eq!(m.judge_calls(), 0);
    }
}
