//! Bounded retry with linear backoff for provider throttling.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Result;
use crate::metrics::METRICS;
use crate::obs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Wait before retry `n` is `base_delay_secs * n`
    pub base_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_secs: 30,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay_secs: base_delay.as_secs(),
        }
    }

    /// Wait before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.base_delay_secs) * attempt
    }
}

/// Run `op` until it succeeds, fails with a non-throttling error, or has
/// been retried `max_retries` times. The last throttling error is returned
/// once the budget is spent.
pub async fn retry_on_throttle<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_throttling() && attempt < policy.max_retries => {
                attempt += 1;
                let wait = policy.delay_for(attempt);
                METRICS.inc_throttle_retries();
                obs::emit_throttle_retry(label, attempt, policy.max_retries, wait);
                tokio::time::sleep(wait).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EvalError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use steplens_remote::RemoteError;
    use tokio::time::Instant;

    fn throttled() -> EvalError {
        RemoteError::throttled("agent-runtime", "Rate exceeded").into()
    }

    #[test]
    fn delay_is_linear() {
        let policy = RetryPolicy::new(3, Duration::from_secs(30));
        assert_eq!(policy.delay_for(1), Duration::from_secs(30));
        assert_eq!(policy.delay_for(3), Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_throttles_within_budget() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_secs(30));
        let start = Instant::now();

        let out = retry_on_throttle(&policy, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(throttled())
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(out, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(30 + 60));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_secs(30));
        let start = Instant::now();

        let err = retry_on_throttle(&policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(throttled()) }
        })
        .await
        .unwrap_err();

        assert!(err.is_throttling());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(30 + 60 + 90));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_wait_thirty_sixty_ninety() {
        let attempts = std::sync::Mutex::new(Vec::new());
        let policy = RetryPolicy::new(3, Duration::from_secs(30));

        let _ = retry_on_throttle(&policy, "test", || {
            attempts.lock().unwrap().push(Instant::now());
            async { Err::<(), _>(throttled()) }
        })
        .await;

        let attempts = attempts.into_inner().unwrap();
        let gaps: Vec<u64> = attempts.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
        assert_eq!(gaps, vec![30, 60, 90]);
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let start = Instant::now();

        let err = retry_on_throttle(&policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(EvalError::NoAnswerReceived) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, EvalError::NoAnswerReceived));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
