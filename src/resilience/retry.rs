//! Bounded retry with capped exponential backoff
//!
//! Stateless and reusable per call. The facade applies it to connection
//! acquisition only: retrying an already-failed statement could duplicate
//! write effects, so statement failures surface immediately.

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;

/// Retry policy with capped exponential backoff
///
/// The delay starts at `initial_delay_ms`, is multiplied by `multiplier`
/// after every failed attempt, and never exceeds `max_delay_ms`. The last
/// error is rethrown untouched once `max_attempts` is exhausted.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a retry policy with default configuration
    pub fn new() -> Self {
        Self::with_config(RetryConfig::default())
    }

    /// Create a retry policy with custom configuration
    pub fn with_config(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Maximum number of attempts, including the first
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Next backoff delay after the given one, capped at the ceiling
    pub fn next_delay(&self, current: Duration) -> Duration {
        let scaled = current.as_millis() as f64 * self.config.multiplier;
        Duration::from_millis((scaled as u64).min(self.config.max_delay_ms))
    }

    /// Run `operation` with bounded retries
    ///
    /// The factory is invoked once per attempt. Every failed attempt is
    /// logged with its index and error; the final failure is rethrown, never
    /// suppressed. An operation failing `n < max_attempts - 1` times before
    /// succeeding is invoked exactly `n + 1` times.
    pub async fn retry<T, E, F, Fut>(&self, op_name: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut delay = Duration::from_millis(self.config.initial_delay_ms);

        for attempt in 1..=self.config.max_attempts {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(
                            operation = op_name,
                            attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) if attempt == self.config.max_attempts => {
                    tracing::warn!(
                        operation = op_name,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = %err,
                        "Operation failed, retries exhausted"
                    );
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(
                        operation = op_name,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Operation failed, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    delay = self.next_delay(delay);
                }
            }
        }

        // max_attempts is validated > 0, so the loop always returns
        unreachable!("retry loop must return within max_attempts")
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}
