//! Connector metrics, recorded through the `metrics` facade.
//!
//! Nothing is exported unless the embedding process installs a recorder.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Label};
use std::time::Duration;

const PRODUCED: &str = "msk_connector_records_produced_total";
const FAILED: &str = "msk_connector_records_failed_total";
const RETRIED: &str = "msk_connector_records_retried_total";
const TOKEN_REFRESH: &str = "msk_connector_token_refresh_total";
const PROVISIONED: &str = "msk_connector_topic_provisioned_total";
const PRODUCE_DURATION: &str = "msk_connector_produce_duration_seconds";
const CONSECUTIVE_FAILURES: &str = "msk_connector_consecutive_failures";
const HEALTH: &str = "msk_connector_health";

/// Metric handles labelled with the connector and its topic
#[derive(Debug, Clone)]
pub struct ConnectorMetrics {
    labels: Vec<Label>,
}

impl ConnectorMetrics {
    pub fn new(connector_name: impl Into<String>, topic: impl Into<String>) -> Self {
        describe();
        Self {
            labels: vec![
                Label::new("connector", connector_name.into()),
                Label::new("topic", topic.into()),
            ],
        }
    }

    fn labels_with(&self, key: &'static str, value: impl Into<String>) -> Vec<Label> {
        let mut labels = self.labels.clone();
        labels.push(Label::new(key, value.into()));
        labels
    }

    /// Record acknowledged by the broker
    pub fn record_success(&self) {
        counter!(PRODUCED, self.labels.clone()).increment(1);
    }

    /// Failed publish attempt, labelled with the error code
    pub fn record_error(&self, error_type: &str) {
        counter!(FAILED, self.labels_with("error_type", error_type)).increment(1);
    }

    pub fn record_retry(&self) {
        counter!(RETRIED, self.labels.clone()).increment(1);
    }

    pub fn record_token_refresh(&self, installed: bool) {
        let outcome = if installed { "installed" } else { "failed" };
        counter!(TOKEN_REFRESH, self.labels_with("outcome", outcome)).increment(1);
    }

    pub fn record_provisioning(&self, outcome: &str) {
        counter!(PROVISIONED, self.labels_with("outcome", outcome)).increment(1);
    }

    /// Time from submit to delivery report
    pub fn record_processing_time(&self, duration: Duration) {
        histogram!(PRODUCE_DURATION, self.labels.clone()).record(duration.as_secs_f64());
    }

    pub fn set_consecutive_failures(&self, count: usize) {
        gauge!(CONSECUTIVE_FAILURES, self.labels.clone()).set(count as f64);
    }

    /// 1 while publishing works, 0 after repeated failures or once stopped
    pub fn set_health(&self, healthy: bool) {
        gauge!(HEALTH, self.labels.clone()).set(if healthy { 1.0 } else { 0.0 });
    }

    #[cfg(test)]
    fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.key() == key)
            .map(|l| l.value())
    }
}

fn describe() {
    describe_counter!(PRODUCED, "Records acknowledged by the broker");
    describe_counter!(FAILED, "Publish attempts that failed");
    describe_counter!(RETRIED, "Publish retries");
    describe_counter!(TOKEN_REFRESH, "Bearer token refreshes by outcome");
    describe_counter!(PROVISIONED, "Topic provisioning runs by outcome");
    describe_histogram!(PRODUCE_DURATION, "Seconds from submit to delivery report");
    describe_gauge!(CONSECUTIVE_FAILURES, "Current streak of failed publish attempts");
    describe_gauge!(HEALTH, "Publishing health (1 = healthy, 0 = unhealthy)");
}
