//! Trait definitions.
//!
//! - `MessageSource`: supplies the content the connector publishes
//! - `TopicAdmin`: the broker admin surface used by the topic provisioner
//! - `RecordProducer`: the broker produce surface used by the publish loop
//!
//! The Kafka implementations of `TopicAdmin` and `RecordProducer` live in `kafka`; tests and
//! embedders can substitute their own.

use crate::{
    ConnectorConfig, ConnectorResult, DeliveryError, DeliveryOutcome, OutboundMessage,
    ProduceRecord, TopicSpec,
};
use async_trait::async_trait;
use std::time::Duration;

/// Trait for implementing message sources (caller content → MSK)
///
/// # Example
///
/// ```rust,no_run
/// use msk_connect_core::{ConnectorConfig, ConnectorResult, MessageSource, OutboundMessage};
/// use async_trait::async_trait;
///
/// pub struct Heartbeat {
///     sent: u64,
/// }
///
/// #[async_trait]
/// impl MessageSource for Heartbeat {
///     async fn next_message(&mut self) -> ConnectorResult<Option<OutboundMessage>> {
///         self.sent += 1;
///         Ok(Some(OutboundMessage::from_string(format!("heartbeat #{}", self.sent))))
///     }
/// }
/// ```
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Called once before the first `next_message`
    async fn initialize(&mut self, config: &ConnectorConfig) -> ConnectorResult<()> {
        let _ = config;
        Ok(())
    }

    /// Content for the next publish attempt
    ///
    /// - `Ok(Some(message))`: publish it
    /// - `Ok(None)`: nothing right now, the loop sleeps for the poll interval
    /// - `Err(_)`: counted as a failure of this iteration, the loop applies its policy
    async fn next_message(&mut self) -> ConnectorResult<Option<OutboundMessage>>;

    /// Optional: called once after the loop stops
    async fn shutdown(&mut self) -> ConnectorResult<()> {
        Ok(())
    }
}

/// Error returned by `TopicAdmin::create_topic`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateTopicError {
    /// The topic exists already (created concurrently elsewhere)
    AlreadyExists,
    /// Any other broker or client failure
    Other(String),
}

/// Broker admin operations needed for provisioning
#[async_trait]
pub trait TopicAdmin: Send + Sync {
    /// Names of all topics known to the cluster, bounded by `timeout`
    async fn fetch_topic_names(&self, timeout: Duration) -> Result<Vec<String>, String>;

    /// Create `spec` and wait for the broker's acknowledgment
    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), CreateTopicError>;
}

/// Broker produce operations needed by the publish loop
#[async_trait]
pub trait RecordProducer: Send + Sync {
    /// Submit `record` and wait for its delivery report
    async fn produce(&self, record: ProduceRecord) -> Result<DeliveryOutcome, DeliveryError>;

    /// Flush outstanding records before the producer is released
    async fn flush(&self, timeout: Duration) -> Result<(), DeliveryError>;
}

/// Message source that repeats one payload forever
#[derive(Debug, Clone)]
pub struct StaticMessageSource {
    payload: String,
    key: Option<String>,
}

impl StaticMessageSource {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            key: None,
        }
    }

    /// Use the same key for every record instead of the correlation id
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

impl Default for StaticMessageSource {
    fn default() -> Self {
        Self::new("default message")
    }
}

#[async_trait]
impl MessageSource for StaticMessageSource {
    async fn next_message(&mut self) -> ConnectorResult<Option<OutboundMessage>> {
        let message = OutboundMessage::from_string(self.payload.clone());
        Ok(Some(match &self.key {
            Some(key) => message.with_key(key.clone()),
            None => message,
        }))
    }
}
