//! Retry with exponential backoff for oracle lookups.
//!
//! Only errors that `OracleError::is_retryable()` accepts are retried.

use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use super::OracleError;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 250,
            max_delay_ms: 4000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, initial_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay_ms,
            ..Default::default()
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(0, 0)
    }
}

/// Run `f` until it succeeds, fails with a non-retryable error, or runs
/// out of attempts.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    mut f: F,
) -> Result<T, OracleError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OracleError>>,
{
    let mut attempt = 0;
    let mut delay_ms = config.initial_delay_ms;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;

                if !err.is_retryable() {
                    return Err(err);
                }
                if attempt > config.max_retries {
                    warn!(operation, attempts = attempt, error = %err, "Giving up after retries");
                    return Err(err);
                }

                debug!(
                    operation,
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms,
                    error = %err,
                    "Retrying after transient failure"
                );

                sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = ((delay_ms as f64 * config.backoff_factor) as u64).min(config.max_delay_ms);
            }
        }
    }
}
