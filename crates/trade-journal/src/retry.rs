use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Bounded exponential backoff for transient storage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry `attempt` (0-based): base, 2x base, 4x base, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// retry budget is spent. Each call of `op` must be a complete transaction.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Transient storage failure, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::error!(operation, "Storage failure after {} retries: {}", attempt, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}
