//! Retry Logic
//!
//! Bounded retry with a fixed backoff for generation requests.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{GenerationError, GenerationResult};

/// Attempt count and fixed delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Create a policy; `attempts` is clamped to at least 1 (1 = no retry)
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Run `operation` up to `policy.attempts()` times.
///
/// **Algorithm:**
/// 1. Attempt operation
/// 2. If successful, return result
/// 3. If it failed and attempts remain: log WARN, wait `policy.delay()`, retry
/// 4. If the last attempt failed: return that attempt's error unmodified
///
/// Cancellation is checked before every attempt and raced against the
/// backoff sleep; either way the result is `GenerationError::Cancelled` and
/// no further attempt is made. An attempt already in flight is never
/// interrupted.
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g., "image #0003")
/// * `policy` - Attempt count and delay
/// * `cancel_token` - Cooperative cancellation signal
/// * `operation` - Closure producing one attempt
pub async fn retry_with_policy<F, Fut, T>(
    operation_name: &str,
    policy: RetryPolicy,
    cancel_token: &CancellationToken,
    mut operation: F,
) -> GenerationResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = GenerationResult<T>>,
{
    let start_time = Instant::now();
    let mut attempt = 0;

    loop {
        if cancel_token.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }

        attempt += 1;

        if attempt > 1 {
            tracing::debug!(operation = operation_name, attempt, "Retrying operation");
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis(),
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if attempt >= policy.attempts() {
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis(),
                        error = %err,
                        "Operation failed: attempts exhausted"
                    );
                    return Err(err);
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts = policy.attempts(),
                    backoff_ms = policy.delay().as_millis(),
                    error = %err,
                    "Operation failed, will retry after backoff"
                );

                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            "Cancelled during retry backoff"
                        );
                        return Err(GenerationError::Cancelled);
                    }
                    _ = tokio::time::sleep(policy.delay()) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_attempt() {
        let token = CancellationToken::new();
        let result = retry_with_policy("test_op", fast_policy(3), &token, || async {
            Ok::<i32, GenerationError>(42)
        })
        .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_k_failures() {
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result = retry_with_policy("test_op", fast_policy(3), &token, move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= 2 {
                    Err(GenerationError::Network(format!("attempt {}", n)))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3, "k failures + 1 success");
    }

    #[tokio::test]
    async fn test_last_error_returned_unmodified() {
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: GenerationResult<()> =
            retry_with_policy("test_op", fast_policy(3), &token, move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Err(GenerationError::RemoteService {
                        status_code: 500 + n as u16,
                        message: format!("attempt {}", n),
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            result.unwrap_err(),
            GenerationError::RemoteService {
                status_code: 503,
                message: "attempt 3".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_single_attempt_means_no_retry() {
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: GenerationResult<()> =
            retry_with_policy("test_op", RetryPolicy::new(0, Duration::ZERO), &token, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(GenerationError::Network("down".to_string())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1, "attempts clamp to 1");
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_stops_retrying() {
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(5, Duration::from_secs(30));

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let counter = calls.clone();
        let started = Instant::now();
        let result: GenerationResult<()> =
            retry_with_policy("test_op", policy, &token, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(GenerationError::Network("down".to_string())) }
            })
            .await;

        assert_eq!(result.unwrap_err(), GenerationError::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5), "backoff was aborted");
    }

    #[tokio::test]
    async fn test_already_cancelled_makes_no_attempt() {
        let token = CancellationToken::new();
        token.cancel();

        let result: GenerationResult<i32> =
            retry_with_policy("test_op", fast_policy(3), &token, || async { Ok(1) }).await;

        assert_eq!(result.unwrap_err(), GenerationError::Cancelled);
    }
}
