//! Bounded exponential-backoff retry for calls to the approval backend.
//!
//! The schedule is `reqwest_retry`'s exponential policy. Each backend
//! request is retried on its own and reports how many attempts it took.

use std::future::Future;
use std::time::{Duration, SystemTime};

use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::{RetryDecision, RetryPolicy as _};
use tracing::warn;

use crate::backend::BackendError;
use crate::config::RetryConfig;
use crate::error::ExternalCallError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    backoff: ExponentialBackoff,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        let max_attempts = config.max_attempts.max(1);
        let initial = Duration::from_millis(config.initial_backoff_ms);
        let max = Duration::from_millis(config.max_backoff_ms).max(initial);
        Self {
            backoff: ExponentialBackoff::builder()
                .retry_bounds(initial, max)
                .build_with_max_retries(max_attempts - 1),
        }
    }

    /// Delay before the next attempt, or `None` once the budget is spent.
    /// `past_retries` counts the retries already made.
    fn next_delay(&self, started: SystemTime, past_retries: u32) -> Option<Duration> {
        match self.backoff.should_retry(started, past_retries) {
            RetryDecision::Retry { execute_after } => Some(
                execute_after
                    .duration_since(SystemTime::now())
                    .unwrap_or_default(),
            ),
            RetryDecision::DoNotRetry => None,
        }
    }
}

/// Run `call` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, ExternalCallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let started = SystemTime::now();
    let mut attempt = 1;
    loop {
        let source = match call().await {
            Ok(value) => return Ok(value),
            Err(source) => source,
        };

        let delay = if source.is_retryable() {
            policy.next_delay(started, attempt - 1)
        } else {
            None
        };
        let Some(delay) = delay else {
            return Err(ExternalCallError {
                operation: operation.to_string(),
                attempts: attempt,
                source,
            });
        };

        warn!(
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %source,
            "External call failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::from_config(&RetryConfig {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        })
    }

    fn unavailable() -> BackendError {
        BackendError::Api {
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    #[test]
    fn test_schedule_is_bounded_and_finite() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 4,
            initial_backoff_ms: 100,
            max_backoff_ms: 300,
        });
        let started = SystemTime::now();
        for past_retries in 0..3 {
            let delay = policy.next_delay(started, past_retries).unwrap();
            assert!(delay <= Duration::from_millis(300), "{delay:?}");
        }
        assert_eq!(policy.next_delay(started, 3), None);
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let policy = quick_policy(0);
        assert_eq!(policy.next_delay(SystemTime::now(), 0), None);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(&quick_policy(3), "fetch", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(unavailable())
            } else {
                Ok("bytes")
            }
        })
        .await;

        assert_eq!(assert_ok!(result), "bytes");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_budget_reports_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&quick_policy(3), "upload", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(unavailable())
        })
        .await;

        let err = assert_err!(result);
        assert_eq!(err.attempts, 3);
        assert_eq!(err.operation, "upload");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&quick_policy(3), "fetch", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::Api {
                status: 404,
                message: "missing".to_string(),
            })
        })
        .await;

        assert_eq!(assert_err!(result).attempts, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
