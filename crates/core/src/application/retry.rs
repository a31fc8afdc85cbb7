// Retry with exponential backoff
//
// Wraps a fallible async operation and retries transient failures with a
// deterministic delay sequence. No jitter: the delay before retry N is fully
// determined by N and the policy.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::error::EngineError;

/// Classifies an error as worth retrying or not
///
/// Transient: the same call is likely to succeed shortly (connection
/// refused/reset, timeout, backend 5xx, rate limiting). Everything else is
/// permanent and must surface to the caller immediately.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for EngineError {
    fn is_transient(&self) -> bool {
        match self {
            EngineError::Connection(_) | EngineError::Timeout(_) | EngineError::Io(_) => true,
            EngineError::Upstream { status, .. } => {
                *status == 429 || (500..=599).contains(status)
            }
            _ => false,
        }
    }
}

/// Backoff schedule for [`retry_with_backoff`]
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap applied to every computed delay
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the retry following failed attempt `attempt` (0-based)
    ///
    /// `min(initial_delay * multiplier^attempt, max_delay)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let raw = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = raw.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Run `op`, retrying transient failures per `policy`
///
/// Permanent errors propagate immediately and unwrapped. When retries
/// exhaust, the LAST error propagates - never a synthetic "retries
/// exhausted" wrapper, so callers can still inspect the original kind.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: &BackoffPolicy, op: F) -> Result<T, E>
where
    E: Retryable + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_with_backoff_observed(policy, op, |_, _| {}).await
}

/// [`retry_with_backoff`] with an observer invoked before each retry
///
/// `on_retry(n, &err)` fires with the 1-based retry number before the
/// corresponding delay elapses.
pub async fn retry_with_backoff_observed<T, E, F, Fut, O>(
    policy: &BackoffPolicy,
    mut op: F,
    mut on_retry: O,
) -> Result<T, E>
where
    E: Retryable + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    O: FnMut(u32, &E),
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, scheduling retry"
                );
                on_retry(attempt + 1, &e);
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn transient() -> EngineError {
        EngineError::Connection("connection refused".to_string())
    }

    #[test]
    fn test_delay_sequence_default_policy() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = BackoffPolicy {
            max_retries: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for(20), Duration::from_secs(10));
    }

    #[test]
    fn test_classification() {
        assert!(transient().is_transient());
        assert!(EngineError::Timeout("deadline".to_string()).is_transient());
        assert!(EngineError::Upstream {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_transient());
        assert!(EngineError::Upstream {
            status: 429,
            message: "slow down".to_string()
        }
        .is_transient());
        assert!(!EngineError::Upstream {
            status: 404,
            message: "gone".to_string()
        }
        .is_transient());
        assert!(!EngineError::Config("bad".to_string()).is_transient());
        assert!(!EngineError::Internal("bug".to_string()).is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_retry_until_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_op = calls.clone();

        let result: Result<(), EngineError> =
            retry_with_backoff(&BackoffPolicy::default(), move || {
                let calls = calls_in_op.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(transient())
                }
            })
            .await;

        // max_retries = 3 means 4 total attempts, last error surfaces as-is
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(result, Err(EngineError::Connection(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_fails_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_op = calls.clone();

        let result: Result<(), EngineError> =
            retry_with_backoff(&BackoffPolicy::default(), move || {
                let calls = calls_in_op.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(EngineError::Upstream {
                        status: 404,
                        message: "not found".to_string(),
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(EngineError::Upstream { status: 404, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_op = calls.clone();

        let result = retry_with_backoff(&BackoffPolicy::default(), move || {
            let calls = calls_in_op.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok("recovered")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_sees_each_retry() {
        let observed: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let observed_in_cb = observed.clone();

        let _: Result<(), EngineError> = retry_with_backoff_observed(
            &BackoffPolicy::default(),
            || async { Err(transient()) },
            move |n, _err| observed_in_cb.lock().unwrap().push(n),
        )
        .await;

        assert_eq!(*observed.lock().unwrap(), vec![1, 2, 3]);
    }
}
