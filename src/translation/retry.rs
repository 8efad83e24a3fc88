/*!
 * Retry policy for rewrite calls.
 *
 * Delays grow exponentially from `base_backoff`, are capped at
 * `max_backoff`, and are spread by a random jitter factor so concurrent
 * workers that failed together do not retry in lockstep.
 */

use std::time::Duration;

use rand::Rng;

use crate::app_config::TranslationCommonConfig;
use crate::errors::TranslationError;

/// How often and how patiently a chunk is retried
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per chunk, including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub base_backoff: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Upper bound for a single delay
    pub max_backoff: Duration,
    /// Relative jitter in `[0, 1]`; 0.1 spreads delays by +/-10%
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_backoff: Duration::from_millis(1000),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Build the policy from the common translation settings
    pub fn from_config(config: &TranslationCommonConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.retry_backoff_ms),
            multiplier: config.retry_backoff_multiplier.max(1.0),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            jitter: config.retry_jitter.clamp(0.0, 1.0),
        }
    }

    /// A policy that never waits, for tests and dry runs
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff: Duration::ZERO,
            multiplier: 1.0,
            max_backoff: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Delay before the attempt that follows failed attempt number `attempt` (1-based), without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.base_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Delay before the next attempt, with jitter applied
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }
        let factor = rand::rng().random_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        base.mul_f64(factor).min(self.max_backoff)
    }

    /// Whether another attempt should follow a failure on attempt `attempt`
    pub fn should_retry(&self, attempt: u32, error: &TranslationError) -> bool {
        attempt < self.max_attempts && error.is_retryable()
    }
}
