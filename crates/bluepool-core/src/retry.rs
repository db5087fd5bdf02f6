//! Retry with exponential backoff for connection attempts.
//!
//! BLE connects to a buried pool probe fail transiently all the time
//! (signal attenuation through water, duty-cycled radio). The transport
//! wraps its connect path in [`with_retry`]; errors that
//! [`Error::is_retryable`] classifies as structural are returned
//! immediately.
//!
//! [`Error::is_retryable`]: crate::error::Error::is_retryable

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::Result;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the backoff delay.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter to each delay to avoid lockstep
    /// reconnects from multiple hosts.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// No retries at all; the first failure is final.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Set the maximum number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay before the first retry.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the upper bound on the backoff delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable delay jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        let final_delay = if self.jitter {
            capped * (1.0 + rand::rng().random_range(0.0..0.25))
        } else {
            capped
        };
        Duration::from_secs_f64(final_delay)
    }
}

/// Run `operation` up to `1 + config.max_retries` times.
///
/// Only errors classified as retryable are retried; others propagate on
/// the first occurrence.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation = operation_name, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && attempt < config.max_retries => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    ?delay,
                    error = %err,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::error::{ConnectFailureReason, Error};

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_first_try() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&RetryConfig::default(), "connect", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default().with_max_retries(3).with_jitter(false);
        let result = with_retry(&config, "connect", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::connect_failed(None, ConnectFailureReason::Timeout))
                } else {
                    Ok("connected")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "connected");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_structural_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default().with_max_retries(5);
        let result: Result<()> = with_retry(&config, "decode", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(Error::MalformedFrame {
                    expected: 11,
                    actual: 3,
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default().with_max_retries(2).with_jitter(false);
        let result: Result<()> = with_retry(&config, "connect", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::connect_failed(None, ConnectFailureReason::Timeout)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let config = RetryConfig::default()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(300))
            .with_jitter(false);
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(300));
        assert_eq!(config.delay_for_attempt(5), Duration::from_millis(300));
    }
}
