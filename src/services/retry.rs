//! Retry policy with exponential backoff and jitter.
//!
//! Backoff doubles with each retry (`base * 2^retry`), capped at `max_delay`,
//! then spread by `±jitter` so concurrent sessions do not retry in lockstep.
//! Only transient failures are retried.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::errors::OracleError;
use crate::domain::models::RetryConfig;

/// Errors that know whether another attempt may help.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for OracleError {
    fn is_transient(&self) -> bool {
        OracleError::is_transient(self)
    }
}

/// Retry policy for fallible async operations.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    /// Fraction of the delay used as random spread, in `[0, 1]`
    jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Create a policy. At least one attempt is always made and jitter is
    /// clamped into `[0, 1]`.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, jitter: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter: if jitter.is_nan() { 0.0 } else { jitter.clamp(0.0, 1.0) },
        }
    }

    /// Policy described by the `retry` config section.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.jitter,
        )
    }

    /// Policy that retries without sleeping; handy for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO, 0.0)
    }

    /// Total attempts including the first, at least 1.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Un-jittered delay before retry number `retry` (0-based).
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay before retry number `retry` with jitter applied.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if self.jitter == 0.0 || base.is_zero() {
            return base;
        }
        let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        base.mul_f64((1.0 + spread).max(0.0))
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// The closure receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns the first non-transient error, or the last transient one
    /// once `max_attempts` is reached.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt - 1);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "transient failure, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_transient() {
                        warn!(attempt, error = %err, "giving up after final attempt");
                    } else {
                        debug!(attempt, error = %err, "permanent failure, not retrying");
                    }
                    return Err(err);
                }
            }
        }
    }
}
