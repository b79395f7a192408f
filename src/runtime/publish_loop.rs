//! Publish loop: caller content → MSK, one record per iteration.
//!
//! The loop runs until its cancellation token fires (or a fail-fast policy trips). Failures
//! of a single record are contained; a streak of failures reaching the configured threshold
//! is reported once as a distinct unhealthy signal.

use crate::retry::FailurePolicy;
use crate::utils::HealthChecker;
use crate::{
    ConnectorError, ConnectorMetrics, ConnectorResult, DeliveryError, DeliveryOutcome,
    MessageSource, ProduceRecord, RecordProducer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of one iteration
#[derive(Debug)]
pub enum PublishAttempt {
    /// The broker acknowledged the record
    Delivered {
        correlation_id: String,
        outcome: DeliveryOutcome,
        retries: u32,
    },
    /// The record could not be delivered (after any retries)
    Failed {
        correlation_id: String,
        error: DeliveryError,
        retries: u32,
    },
    /// The message source itself failed
    SourceFailed(String),
    /// The message source had nothing to send
    Idle,
}

impl PublishAttempt {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            PublishAttempt::Failed { .. } | PublishAttempt::SourceFailed(_)
        )
    }

    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            PublishAttempt::Delivered { correlation_id, .. }
            | PublishAttempt::Failed { correlation_id, .. } => Some(correlation_id),
            _ => None,
        }
    }
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
}

/// Totals reported when the loop stops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSummary {
    pub delivered: u64,
    pub failed: u64,
    /// Longest run of consecutive failed iterations
    pub longest_failure_streak: usize,
    pub stop_reason: StopReason,
}

/// Drives a `MessageSource` into a `RecordProducer`
pub struct PublishLoop<S: MessageSource> {
    topic: String,
    source: S,
    producer: Arc<dyn RecordProducer>,
    policy: FailurePolicy,
    health: HealthChecker,
    metrics: Arc<ConnectorMetrics>,
    poll_interval: Duration,
    flush_timeout: Duration,
    delivered: u64,
    failed: u64,
}

impl<S: MessageSource> PublishLoop<S> {
    pub fn new(
        topic: impl Into<String>,
        source: S,
        producer: Arc<dyn RecordProducer>,
        metrics: Arc<ConnectorMetrics>,
    ) -> Self {
        Self {
            topic: topic.into(),
            source,
            producer,
            policy: FailurePolicy::Continue,
            health: HealthChecker::new(5),
            metrics,
            poll_interval: Duration::from_millis(100),
            flush_timeout: Duration::from_secs(10),
            delivered: 0,
            failed: 0,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: usize) -> Self {
        self.health = HealthChecker::new(threshold);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_flush_timeout(mut self, flush_timeout: Duration) -> Self {
        self.flush_timeout = flush_timeout;
        self
    }

    pub fn health(&self) -> &HealthChecker {
        &self.health
    }

    /// Run one iteration: fetch content, publish it, account for the result
    ///
    /// Retries (under `RetryWithBackoff`) happen inside the iteration and stop early when
    /// `cancel` fires.
    pub async fn next_attempt(&mut self, cancel: &CancellationToken) -> PublishAttempt {
        let message = match self.source.next_message().await {
            Ok(Some(message)) => message,
            Ok(None) => return PublishAttempt::Idle,
            Err(e) => {
                error!(topic = %self.topic, error = %e, "Unexpected message source error");
                self.metrics.record_error("source");
                let attempt = PublishAttempt::SourceFailed(e.to_string());
                self.account(&attempt);
                return attempt;
            }
        };

        let record = ProduceRecord::from_message(self.topic.clone(), message);
        let correlation_id = record.correlation_id().to_string();
        let mut retries = 0u32;

        let attempt = loop {
            let start = Instant::now();
            match self.producer.produce(record.clone()).await {
                Ok(outcome) => {
                    self.metrics.record_processing_time(start.elapsed());
                    self.metrics.record_success();
                    info!(
                        topic = %outcome.topic,
                        partition = outcome.partition,
                        offset = outcome.offset,
                        correlation_id = %correlation_id,
                        "Produced message to {}",
                        outcome
                    );
                    break PublishAttempt::Delivered {
                        correlation_id,
                        outcome,
                        retries,
                    };
                }
                Err(err) => {
                    error!(
                        topic = %self.topic,
                        correlation_id = %correlation_id,
                        code = %err.code,
                        reason = %err.message,
                        "Failed to deliver message"
                    );
                    self.metrics.record_error(&err.code);

                    let backoff = match &self.policy {
                        FailurePolicy::RetryWithBackoff(strategy)
                            if strategy.should_retry(retries) =>
                        {
                            Some(strategy.calculate_backoff(retries + 1))
                        }
                        _ => None,
                    };

                    match backoff {
                        Some(delay) if !sleep_or_cancel(delay, cancel).await => {
                            retries += 1;
                            self.metrics.record_retry();
                            debug!(correlation_id = %correlation_id, retries, "Retrying message");
                        }
                        _ => {
                            break PublishAttempt::Failed {
                                correlation_id,
                                error: err,
                                retries,
                            }
                        }
                    }
                }
            }
        };

        self.account(&attempt);
        attempt
    }

    fn account(&mut self, attempt: &PublishAttempt) {
        match attempt {
            PublishAttempt::Delivered { .. } => {
                self.delivered += 1;
                if self.health.record_success() {
                    info!(topic = %self.topic, "Publishing recovered");
                    self.metrics.set_health(true);
                }
            }
            PublishAttempt::Failed { .. } | PublishAttempt::SourceFailed(_) => {
                self.failed += 1;
                if self.health.record_failure() {
                    let since_last_success_ms = self
                        .health
                        .time_since_last_success()
                        .map(|elapsed| elapsed.as_millis() as u64);
                    error!(
                        topic = %self.topic,
                        consecutive_failures = self.health.consecutive_failures(),
                        since_last_success_ms,
                        "Repeated consecutive publish failures, delivery appears broken"
                    );
                    self.metrics.set_health(false);
                }
            }
            PublishAttempt::Idle => return,
        }
        self.metrics
            .set_consecutive_failures(self.health.consecutive_failures());
    }

    /// Run until `cancel` fires, then flush the producer and shut the source down
    ///
    /// Returns an error only when the `FailFast` policy trips; the producer and source are
    /// released on that path too.
    pub async fn run(mut self, cancel: CancellationToken) -> ConnectorResult<PublishSummary> {
        info!(topic = %self.topic, "Entering publish loop");

        let outcome = loop {
            if cancel.is_cancelled() {
                break Ok(StopReason::Cancelled);
            }

            let attempt = self.next_attempt(&cancel).await;
            match attempt {
                PublishAttempt::Delivered { .. } => {}
                PublishAttempt::Idle => {
                    sleep_or_cancel(self.poll_interval, &cancel).await;
                }
                PublishAttempt::Failed { error, retries, .. } => match &self.policy {
                    FailurePolicy::FailFast => break Err(ConnectorError::Delivery(error)),
                    FailurePolicy::RetryWithBackoff(strategy) => {
                        // Retries inside the attempt already backed off
                        let backoff = if retries == 0 {
                            strategy
                                .calculate_backoff(self.health.consecutive_failures() as u32)
                        } else {
                            Duration::ZERO
                        };
                        sleep_or_cancel(backoff.max(self.poll_interval), &cancel).await;
                    }
                    FailurePolicy::Continue => {
                        sleep_or_cancel(self.poll_interval, &cancel).await;
                    }
                },
                PublishAttempt::SourceFailed(reason) => {
                    let pause = match &self.policy {
                        FailurePolicy::FailFast => {
                            break Err(ConnectorError::fatal(format!(
                                "Message source failed: {}",
                                reason
                            )))
                        }
                        FailurePolicy::RetryWithBackoff(strategy) => strategy
                            .calculate_backoff(self.health.consecutive_failures() as u32),
                        FailurePolicy::Continue => self.poll_interval,
                    };
                    sleep_or_cancel(pause, &cancel).await;
                }
            }
        };

        self.teardown().await;

        let stop_reason = outcome?;
        let summary = PublishSummary {
            delivered: self.delivered,
            failed: self.failed,
            longest_failure_streak: self.health.longest_streak(),
            stop_reason,
        };
        info!(
            delivered = summary.delivered,
            failed = summary.failed,
            "Publish loop stopped"
        );
        Ok(summary)
    }

    async fn teardown(&mut self) {
        if let Err(e) = self.producer.flush(self.flush_timeout).await {
            warn!(error = %e, "Failed to flush producer");
        }
        if let Err(e) = self.source.shutdown().await {
            warn!(error = %e, "Message source shutdown failed");
        }
        self.metrics.set_health(false);
    }
}

/// Sleep for `duration`; returns true when cancelled first
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
