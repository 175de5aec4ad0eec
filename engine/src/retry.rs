//! Retry with exponential backoff
//!
//! Wraps a fallible async operation. Authentication failures (401/403) are
//! returned on the spot; everything else is retried with a doubling, capped
//! delay until the attempts run out.

use sdk::errors::BoardError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Backoff policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Ceiling for the doubled delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(8000),
        }
    }
}

impl RetryPolicy {
    /// Delay slept after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Errors the retry loop can classify.
pub trait Retryable {
    /// True when retrying cannot help and the error must surface immediately.
    fn is_fatal(&self) -> bool;
}

impl Retryable for BoardError {
    fn is_fatal(&self) -> bool {
        self.is_auth_failure()
    }
}

/// Run `op` under `policy`.
///
/// `label` names the operation in the retry diagnostics.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) if attempt >= max_attempts => {
                warn!(attempt, error = %e, "{} failed, giving up", label);
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    attempt,
                    next_delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "{} failed, retrying",
                    label
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
