//! Health tracking for the publish loop.
//!
//! Counts consecutive failed publish attempts. Crossing the threshold is reported exactly once
//! per failure streak so the caller can raise a distinct "repeated failures" signal instead of
//! looping silently.

use std::time::{Duration, Instant};

/// Health check status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Last attempt succeeded
    Healthy,
    /// Failing, below the threshold
    Degraded,
    /// At least `failure_threshold` consecutive failures
    Unhealthy,
}

/// Health checker with failure streak tracking
#[derive(Debug)]
pub struct HealthChecker {
    status: HealthStatus,
    consecutive_failures: usize,
    longest_streak: usize,
    last_success: Option<Instant>,
    failure_threshold: usize,
}

impl HealthChecker {
    /// Create a new health checker; a threshold of 0 is treated as 1
    pub fn new(failure_threshold: usize) -> Self {
        Self {
            status: HealthStatus::Healthy,
            consecutive_failures: 0,
            longest_streak: 0,
            last_success: None,
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// Record a successful attempt; returns true when this ends an unhealthy streak
    pub fn record_success(&mut self) -> bool {
        let recovered = self.status == HealthStatus::Unhealthy;
        self.consecutive_failures = 0;
        self.last_success = Some(Instant::now());
        self.status = HealthStatus::Healthy;
        recovered
    }

    /// Record a failed attempt; returns true when this failure crosses the threshold
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;
        self.longest_streak = self.longest_streak.max(self.consecutive_failures);

        if self.consecutive_failures >= self.failure_threshold {
            let crossed = self.status != HealthStatus::Unhealthy;
            self.status = HealthStatus::Unhealthy;
            crossed
        } else {
            self.status = HealthStatus::Degraded;
            false
        }
    }

    /// Get the current health status
    pub fn status(&self) -> HealthStatus {
        self.status
    }

    /// Check if the loop is healthy
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    /// Get consecutive failure count
    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures
    }

    /// Longest failure streak seen so far
    pub fn longest_streak(&self) -> usize {
        self.longest_streak
    }

    /// Time since the last successful attempt; `None` if nothing succeeded yet
    pub fn time_since_last_success(&self) -> Option<Duration> {
        self.last_success.map(|t| t.elapsed())
    }
}
