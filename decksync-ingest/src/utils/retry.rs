//! Retry with exponential backoff
//!
//! Two flavours share the same backoff shape:
//! - [`retry_transient`]: fixed attempt count for source fetches; only
//!   [`SourceError::Transient`] is retried.
//! - [`retry_on_lock`]: time-bounded retry of SQLite lock contention.

use std::time::{Duration, Instant};

use decksync_common::{Error, Result};

use crate::types::SourceError;

/// Backoff policy for source fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Delay before the second attempt; doubles afterwards
    pub base_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(8),
        }
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(250))
    }
}

/// Run `operation` until it succeeds, fails terminally, or attempts run out
///
/// Exhausting the attempts turns the last transient failure into
/// [`SourceError::Exhausted`].
pub async fn retry_transient<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> std::result::Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, SourceError>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation = operation_name, attempt, "Fetch succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !err.is_transient() => {
                tracing::warn!(operation = operation_name, attempt, error = %err, "Terminal fetch failure, not retrying");
                return Err(err);
            }
            Err(err) => {
                if attempt >= policy.attempts {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Fetch failed: retry attempts exhausted"
                    );
                    let reason = match &err {
                        SourceError::Transient { reason, .. } => reason.clone(),
                        other => other.to_string(),
                    };
                    return Err(SourceError::Exhausted {
                        url: err.url().to_string(),
                        attempts: attempt,
                        last: reason,
                    });
                }

                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient fetch failure, will retry after backoff"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Retry a database operation while SQLite reports lock contention
///
/// Non-lock errors return immediately. Backoff starts at 10ms, doubles,
/// and is capped at 1000ms; after `max_wait_ms` the last error is returned.
pub async fn retry_on_lock<F, Fut, T>(operation_name: &str, max_wait_ms: u64, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0;
    let mut backoff_ms = 10u64;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Database operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_database_locked() {
                    return Err(err);
                }

                let elapsed = start_time.elapsed();
                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        max_wait_ms,
                        "Database operation failed: max retry time exceeded"
                    );
                    return Err(Error::Internal(format!(
                        "Database locked after {} attempts ({} ms elapsed, max {} ms)",
                        attempt,
                        elapsed.as_millis(),
                        max_wait_ms
                    )));
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    "Database locked, will retry after backoff"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(1000);
            }
        }
    }
}
