//! Retry decisions and exponential backoff with jitter.

use crate::error::HttpError;
use rand::Rng;
use rebound_config::RetryConfig;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Custom retry predicate, called with the failed attempt's error and number.
///
/// Consulted only after the attempt is within `max_retries` and the status is
/// retryable; it is never called otherwise.
#[derive(Clone)]
pub struct ShouldRetry(Arc<dyn Fn(&HttpError, u32) -> bool + Send + Sync>);

impl ShouldRetry {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&HttpError, u32) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    /// A predicate that always allows the retry.
    pub fn always() -> Self {
        Self::new(|_, _| true)
    }

    pub fn check(&self, error: &HttpError, attempt: u32) -> bool {
        (self.0)(error, attempt)
    }
}

impl Default for ShouldRetry {
    fn default() -> Self {
        Self::always()
    }
}

impl fmt::Debug for ShouldRetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ShouldRetry(..)")
    }
}

/// Runtime retry policy: the configured limits plus the custom predicate.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
    should_retry: ShouldRetry,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            should_retry: ShouldRetry::default(),
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        })
    }

    /// Replace the custom predicate.
    pub fn with_should_retry(mut self, should_retry: ShouldRetry) -> Self {
        self.should_retry = should_retry;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether the failed `attempt` (numbered from 1) may be retried.
    ///
    /// All of: the attempt is within `max_retries`, the status is retryable,
    /// and the custom predicate agrees. Checked in that order, so the
    /// predicate is skipped when either earlier check fails.
    pub fn allows(&self, error: &HttpError, attempt: u32) -> bool {
        attempt <= self.config.max_retries
            && self.config.is_retryable_status(error.status())
            && self.should_retry.check(error, attempt)
    }

    /// Backoff before retrying after `attempt`, with random jitter.
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        self.delay_for(attempt, rand::thread_rng().gen::<f64>())
    }

    /// Backoff before retrying after `attempt` for a given uniform `sample`
    /// in `[0, 1)`.
    ///
    /// `min(initial * 2^(attempt-1), max)` scaled by
    /// `1 + (sample * 2 - 1) * jitter`.
    pub fn delay_for(&self, attempt: u32, sample: f64) -> Duration {
        self.base_delay(attempt).mul_f64(self.jitter_factor(sample))
    }

    /// Backoff before jitter is applied.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.config
            .initial_delay()
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.config.max_delay())
    }

    fn jitter_factor(&self, sample: f64) -> f64 {
        let jitter = if self.config.jitter.is_finite() {
            self.config.jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let sample = if sample.is_finite() {
            sample.clamp(0.0, 1.0)
        } else {
            0.5
        };
        1.0 + (sample * 2.0 - 1.0) * jitter
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self::new(config)
    }
}
