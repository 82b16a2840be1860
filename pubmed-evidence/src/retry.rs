//! Retry policy for transient upstream failures
//!
//! The policy is a plain value ([`RetryConfig`]) plus a predicate on the
//! error type ([`RetryableError`]); [`with_retry`] drives any async operation
//! with them, so the backoff schedule can be exercised with a fake operation.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Errors that can tell whether repeating the operation may succeed
pub trait RetryableError {
    /// `true` for transient failures (timeouts, connection errors, 429, 5xx)
    fn is_retryable(&self) -> bool;

    /// Human-readable reason, used in retry logs
    fn retry_reason(&self) -> &str;
}

/// Exponential backoff configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor applied per retry
    pub backoff_multiplier: f64,
    /// Randomize each delay within `[delay / 2, delay]`
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Un-jittered delay before retry number `retry` (0-based)
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(retry as i32);
        let millis = (self.initial_delay.as_millis() as f64 * factor)
            .min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    /// Delay actually slept before retry number `retry`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if !self.use_jitter || base.is_zero() {
            return base;
        }
        let max = base.as_millis() as u64;
        let min = max / 2;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the retry budget is spent. The last error is returned unchanged.
pub async fn with_retry<T, E, F, Fut>(
    mut operation: F,
    config: &RetryConfig,
    context: &str,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + Display,
{
    let mut retry = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if retry > 0 {
                    debug!(context, attempts = retry + 1, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && retry < config.max_retries => {
                let delay = config.delay_for(retry);
                warn!(
                    context,
                    attempt = retry + 1,
                    max_attempts = config.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    reason = err.retry_reason(),
                    error = %err,
                    "Retrying after transient failure"
                );
                sleep(delay).await;
                retry += 1;
            }
            Err(err) => {
                if err.is_retryable() {
                    warn!(context, attempts = retry + 1, error = %err, "Retries exhausted");
                } else {
                    debug!(context, reason = err.retry_reason(), "Non-retryable failure");
                }
                return Err(err);
            }
        }
    }
}
