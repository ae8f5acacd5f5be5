//! Bounded retry with exponential backoff.
//!
//! Every external call (embedding, web search, generation) goes through
//! [`retry_with_backoff`]. Only transient errors are retried; the last error
//! is returned once the attempt budget is spent.

use std::future::Future;
use std::time::Duration;

use crate::error::AppResult;

/// How many times to try and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// A single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Backoff before retry number `attempt` (1-based): `initial * 2^(attempt - 1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100))
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempt budget is exhausted.
pub async fn retry_with_backoff<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() || attempt >= policy.max_attempts => {
                if attempt > 1 {
                    tracing::warn!("{} failed after {} attempts: {}", label, attempt, e);
                }
                return Err(e);
            }
            Err(e) => {
                let backoff = policy.backoff(attempt);
                tracing::warn!(
                    "{} failed (attempt {}/{}), retrying in {}ms: {}",
                    label,
                    attempt,
                    policy.max_attempts,
                    backoff.as_millis(),
                    e
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, IngestionError};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let result = retry_with_backoff(policy, "flaky", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AppError::Llm("connection reset".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let result: AppResult<()> = retry_with_backoff(policy, "down", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::Llm("503".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);

        let result: AppResult<()> = retry_with_backoff(RetryPolicy::default(), "parse", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(IngestionError::EmptyDocument("x.md".into()).into()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
