//! Bounded exponential-backoff retry for upstream calls

use crate::constants::{INITIAL_BACKOFF_MS, MAX_BACKOFF_MS, MAX_RETRIES};
use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Which failures are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryMode {
    /// Every error kind is retried, `NotFound` included
    #[default]
    Uniform,
    /// Only rate limiting, outages and network failures are retried
    TransientOnly,
}

impl RetryMode {
    fn should_retry(&self, err: &ProviderError) -> bool {
        match self {
            RetryMode::Uniform => true,
            RetryMode::TransientOnly => err.is_transient(),
        }
    }
}

/// Retry policy: `1 + max_retries` attempts, delay doubling after each failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub mode: RetryMode,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            mode: RetryMode::Uniform,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: RetryMode) -> Self {
        self.mode = mode;
        self
    }

    /// Runs `operation` until it succeeds or the retry budget is spent
    ///
    /// The backoff sleeps on the tokio timer so other tasks keep running.
    /// When retries are exhausted, or the mode declines to retry, the last
    /// error is returned unchanged.
    pub async fn execute<F, Fut, T>(&self, label: &str, mut operation: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut remaining = self.max_retries;
        let mut delay = self.initial_delay;
        let mut attempt: u32 = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if remaining > 0 && self.mode.should_retry(&e) => {
                    tracing::warn!(
                        operation = label,
                        attempt = attempt,
                        max_attempts = self.max_retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Upstream call failed, retrying"
                    );
                    sleep(delay).await;
                    delay = (delay * 2).min(self.max_delay);
                    remaining -= 1;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::debug!(operation = label, attempt = attempt, error = %e, "Giving up");
                    return Err(e);
                }
            }
        }
    }
}
