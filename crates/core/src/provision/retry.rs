//! Bounded retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use super::error::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            self.base_delay.as_millis() as u64,
            self.max_delay.as_millis() as u64,
        )
    }
}

/// Exponential backoff calculator with jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    attempt: u32,
}

impl Backoff {
    /// Create a new backoff starting at `base_ms` with a cap of `max_ms`.
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms,
            attempt: 0,
        }
    }

    /// Get the next delay and increment the attempt counter. Never exceeds
    /// the cap, jitter included.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u64.checked_shl(self.attempt).unwrap_or(u64::MAX);
        let capped = self.base_ms.saturating_mul(factor).min(self.max_ms);
        let jitter = rand::random::<u64>() % (capped / 4 + 1);
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(capped.saturating_add(jitter).min(self.max_ms))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Runs `operation` until it succeeds, fails fatally or runs out of attempts.
///
/// Returns the final result and the number of attempts made. Exhausted
/// transient failures escalate to [`ProviderError::Fatal`].
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    resource: &str,
    mut operation: F,
) -> (Result<T, ProviderError>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.backoff();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return (Ok(value), attempt),
            Err(ProviderError::Transient(message)) if attempt < max_attempts => {
                let delay = backoff.next_delay();
                tracing::warn!(
                    resource,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "transient provider error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(ProviderError::Transient(message)) => {
                return (
                    Err(ProviderError::Fatal(format!(
                        "retries exhausted after {attempt} attempts: {message}"
                    ))),
                    attempt,
                );
            }
            Err(error) => return (Err(error), attempt),
        }
    }
}
