//! ProduceRecord and DeliveryOutcome

use crate::OutboundMessage;
use std::fmt;
use uuid::Uuid;

/// Header carrying the per-record correlation id
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// One publish attempt, built fresh for every iteration of the loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceRecord {
    pub topic: String,
    pub key: String,
    pub value: Vec<u8>,
    /// Ordered headers; the correlation id header always comes first
    pub headers: Vec<(String, String)>,
}

impl ProduceRecord {
    /// Build a record for `topic` from `message`, stamping a new correlation id
    ///
    /// The message key is kept when present, otherwise the correlation id becomes the key.
    pub fn from_message(topic: impl Into<String>, message: OutboundMessage) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        let key = message.key.unwrap_or_else(|| correlation_id.clone());

        let mut headers = Vec::with_capacity(message.headers.len() + 1);
        headers.push((CORRELATION_ID_HEADER.to_string(), correlation_id));
        let mut extra: Vec<_> = message
            .headers
            .into_iter()
            .filter(|(k, _)| k != CORRELATION_ID_HEADER)
            .collect();
        extra.sort();
        headers.extend(extra);

        Self {
            topic: topic.into(),
            key,
            value: message.value,
            headers,
        }
    }

    /// The correlation id stamped on this record
    pub fn correlation_id(&self) -> &str {
        self.header(CORRELATION_ID_HEADER).unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Broker acknowledgment of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // topic [partition] @offset
        write!(f, "{} [{}] @{}", self.topic, self.partition, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_gets_fresh_correlation_id() {
        let a = ProduceRecord::from_message("orders-v1", OutboundMessage::from_string("x"));
        let b = ProduceRecord::from_message("orders-v1", OutboundMessage::from_string("x"));

        assert_ne!(a.correlation_id(), b.correlation_id());
        assert!(Uuid::parse_str(a.correlation_id()).is_ok());
        assert_eq!(a.headers[0].0, CORRELATION_ID_HEADER);
    }

    #[test]
    fn test_key_defaults_to_correlation_id() {
        let record = ProduceRecord::from_message("t", OutboundMessage::from_string("x"));
        assert_eq!(record.key, record.correlation_id());

        let keyed = ProduceRecord::from_message(
            "t",
            OutboundMessage::from_string("x").with_key("customer-7"),
        );
        assert_eq!(keyed.key, "customer-7");
        assert_ne!(keyed.key, keyed.correlation_id());
    }

    #[test]
    fn test_caller_cannot_override_correlation_header() {
        let record = ProduceRecord::from_message(
            "t",
            OutboundMessage::from_string("x")
                .with_header(CORRELATION_ID_HEADER, "spoofed")
                .with_header("source", "demo"),
        );

        assert_ne!(record.correlation_id(), "spoofed");
        assert_eq!(record.headers.len(), 2);
        assert_eq!(record.header("source"), Some("demo"));
    }

    #[test]
    fn test_outcome_display() {
        let outcome = DeliveryOutcome {
            topic: "orders-v1".into(),
            partition: 2,
            offset: 41,
        };
        assert_eq!(outcome.to_string(), "orders-v1 [2] @41");
    }
}
