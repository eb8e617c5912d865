//! Retry policy for files that hit transient storage contention.
//!
//! Exponential backoff with configurable parameters.

use super::error::EtlError;
use crate::config::RetrySettings;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    /// Cap for the exponential growth.
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_backoff_ms: settings.initial_backoff_ms,
            max_backoff_ms: settings.max_backoff_ms,
            backoff_multiplier: settings.backoff_multiplier,
        }
    }

    /// `initial_backoff * multiplier^retry_count`, capped at `max_backoff_ms`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let backoff = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(backoff.min(self.max_backoff_ms as f64) as u64)
    }

    pub fn should_retry(&self, error: &EtlError, retry_count: u32) -> bool {
        error.is_retryable() && retry_count < self.max_retries
    }

    /// Run `attempt` until it succeeds, fails with a non-retryable error, or
    /// the retry budget is spent. `on_retry` sees each error that is about to
    /// be retried together with the upcoming retry number.
    pub fn run<T, F, R>(&self, mut attempt: F, mut on_retry: R) -> Result<T, EtlError>
    where
        F: FnMut() -> Result<T, EtlError>,
        R: FnMut(&EtlError, u32, Duration),
    {
        let mut retry_count = 0;
        loop {
            match attempt() {
                Ok(value) => return Ok(value),
                Err(e) if self.should_retry(&e, retry_count) => {
                    let wait = self.backoff(retry_count);
                    retry_count += 1;
                    on_retry(&e, retry_count, wait);
                    std::thread::sleep(wait);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetrySettings::default())
    }
}
