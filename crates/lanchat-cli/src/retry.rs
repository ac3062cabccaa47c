//! Bounded retry for request cycles.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Sending a message and disconnecting: three tries, back to back.
    pub const SEND: Self = Self {
        max_attempts: 3,
        backoff: Duration::ZERO,
    };

    /// List refreshes: nine tries, one second apart.
    pub const REFRESH: Self = Self {
        max_attempts: 9,
        backoff: Duration::from_secs(1),
    };

    /// Run `attempt` until it succeeds, fails with a non-retryable error, or
    /// the attempts are used up. Returns the last error in the latter cases.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, SessionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SessionError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut n = 1;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() || n >= max_attempts => return Err(e),
                Err(e) => {
                    warn!(operation, attempt = n, max_attempts, error = %e, "Attempt failed, retrying");
                }
            }
            n += 1;
            if !self.backoff.is_zero() {
                tokio::time::sleep(self.backoff).await;
            }
        }
    }
}
