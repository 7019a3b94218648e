// src/retry/strategy.rs

use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryStrategy {
    config: RetryConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("Maximum retry attempts ({0}) exceeded")]
    MaxAttemptsExceeded(u32),
}

impl RetryStrategy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Execute a function with retry logic
    pub async fn execute<F, Fut, T, E>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match f().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if attempt >= self.max_attempts() {
                        warn!("Retry failed after {} attempts: {}", attempt, error);
                        return Err(error);
                    }

                    let backoff = self.calculate_backoff(attempt);
                    debug!(
                        "Attempt {} failed: {}. Retrying in {:?}",
                        attempt, error, backoff
                    );

                    sleep(backoff).await;
                }
            }
        }
    }

    /// Like `execute` for lookups that either find something or not.
    pub async fn execute_option<F, Fut, T>(&self, mut f: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let attempts = self.max_attempts();
        self.execute(|| {
            let fut = f();
            async move { fut.await.ok_or(RetryError::MaxAttemptsExceeded(attempts)) }
        })
        .await
    }

    /// Calculate exponential backoff with jitter
    fn calculate_backoff(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_base().as_millis() as u64;
        let max = self.config.backoff_max().as_millis() as u64;

        // Exponential backoff: base * 2^(attempt - 1)
        let exponential = base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));

        let capped = exponential.min(max);

        // Jitter of 0-25% on top
        let jitter = (capped as f64 * rand::random::<f64>() * 0.25) as u64;

        Duration::from_millis(capped + jitter)
    }
}
