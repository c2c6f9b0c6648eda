//! Retry policy for provider dispatch calls.

use std::time::Duration;

/// Default initial retry delay in milliseconds.
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 500;

/// Default backoff multiplier between attempts.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default ceiling on a single retry delay, in seconds.
pub const DEFAULT_MAX_DELAY_SECS: u64 = 30;

/// Default total attempts per unit of work (1 initial + 2 retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Exponential backoff policy for transient dispatch errors.
///
/// Only transient provider errors are retried; permanent rejections fail
/// the unit immediately regardless of remaining attempts.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Multiplier applied to the delay after each retry.
    pub multiplier: f64,

    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries. Useful in tests.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// The delay to sleep before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let millis = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent as i32);
        Duration::from_millis(millis as u64).min(self.max_delay)
    }
}
