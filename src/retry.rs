//! Backoff for publish retries, and the policy the publish loop applies to failed records.

use crate::RetrySettings;
use rand::Rng;
use std::time::Duration;

/// Capped exponential backoff with optional jitter
///
/// Built from `RetrySettings` in `ConnectorConfig`, or directly for tests and embedders.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryStrategy {
    max_retries: u32,
    initial: Duration,
    cap: Duration,
    factor: u32,
    jitter: bool,
}

impl RetryStrategy {
    /// Doubling backoff from `retry_backoff_ms`, capped at `max_backoff_ms`, jittered
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial: Duration::from_millis(settings.retry_backoff_ms),
            cap: Duration::from_millis(settings.max_backoff_ms.max(settings.retry_backoff_ms)),
            factor: 2,
            jitter: true,
        }
    }

    /// Doubling backoff from 1 s up to 30 s
    pub fn exponential_backoff(max_retries: u32) -> Self {
        Self::from_settings(&RetrySettings {
            max_retries,
            ..RetrySettings::default()
        })
    }

    /// The same delay before every retry, no jitter
    pub fn fixed_delay(max_retries: u32, delay_ms: u64) -> Self {
        let delay = Duration::from_millis(delay_ms);
        Self {
            max_retries,
            initial: delay,
            cap: delay,
            factor: 1,
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (1-based); zero for attempt 0
    ///
    /// With jitter the delay is drawn from `[d/2, d]` where `d` is the capped exponential
    /// delay, so it never exceeds the cap.
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let growth = self.factor.saturating_pow(attempt - 1);
        let delay = self.initial.saturating_mul(growth).min(self.cap);

        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let half = delay / 2;
        half + half.mul_f64(rand::rng().random_range(0.0..=1.0))
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether another retry is allowed after `retries_done` retries
    pub fn should_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::exponential_backoff(3)
    }
}

/// What the publish loop does when a record fails
#[derive(Debug, Clone, Default)]
pub enum FailurePolicy {
    /// Log the failure and move on to the next record
    #[default]
    Continue,
    /// Retry the same record with backoff, then move on
    RetryWithBackoff(RetryStrategy),
    /// Stop the loop and return the error
    FailFast,
}
