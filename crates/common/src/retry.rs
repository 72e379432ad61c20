use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::{Error, Result};

/// Exponential backoff policy shared by market data fetches, order
/// submission and notification delivery.
///
/// The delay before retry `n` (1-based) is `min(max_delay, base_delay * 2^n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// A policy that never sleeps. Handy for tests and one-shot tools.
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, Duration::ZERO, Duration::ZERO)
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent. On exhaustion the last error is wrapped in
    /// [`Error::RetriesExhausted`].
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(
                        operation,
                        attempt = retry + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Attempt failed"
                    );
                    if retry >= self.max_retries {
                        return Err(Error::RetriesExhausted {
                            operation: operation.to_string(),
                            attempts: retry + 1,
                            last: Box::new(e),
                        });
                    }
                    retry += 1;
                    tokio::time::sleep(self.delay_for(retry)).await;
                }
            }
        }
    }
}
