//! Generic exponential-backoff retry executor.
//!
//! The delay is honored as an actual `tokio::time::sleep`, never a
//! busy-wait, so a paused test clock can drive it deterministically.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::errors::Retryable;

/// Exponential-backoff retry settings.
///
/// `retry_terminal_failures` retries every failure regardless of
/// classification; it exists as a named policy choice so tests can pin
/// either behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub retry_terminal_failures: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            retry_terminal_failures: false,
        }
    }
}

impl RetryPolicy {
    /// Run `op`, re-invoking it on failure with geometrically growing
    /// delays (capped at `max_delay_ms`) in between. Exhausting
    /// `max_retries` returns the last error; a terminal error returns
    /// immediately unless `retry_terminal_failures` is set.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut delay = Duration::from_millis(self.initial_delay_ms);
        let mut attempt: u32 = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !self.retry_terminal_failures && !err.is_retryable() {
                        return Err(err);
                    }
                    if attempt >= self.max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "operation failed, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;

                    let grown = (delay.as_millis() as f64) * self.backoff_multiplier;
                    delay = Duration::from_millis((grown as u64).min(self.max_delay_ms));
                }
            }
        }
    }
}
