//! OutboundMessage - content handed to the publish loop by a message source

use crate::{ConnectorError, ConnectorResult};
use serde::Serialize;
use std::collections::HashMap;

/// Content for one publish attempt
///
/// Payloads are opaque bytes; the connector does not impose a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// The message payload
    pub value: Vec<u8>,
    /// Optional record key; the correlation id is used when absent
    pub key: Option<String>,
    /// Extra headers, sent alongside the correlation id header
    pub headers: HashMap<String, String>,
}

impl OutboundMessage {
    /// Create a message from raw bytes
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            key: None,
            headers: HashMap::new(),
        }
    }

    /// Create a message from a UTF-8 string payload
    ///
    /// # Example
    /// ```ignore
    /// let message = OutboundMessage::from_string("default message");
    /// ```
    pub fn from_string(payload: impl Into<String>) -> Self {
        Self::new(payload.into().into_bytes())
    }

    /// Create a message from any serializable value, encoded as JSON
    ///
    /// # Example
    /// ```ignore
    /// #[derive(Serialize)]
    /// struct OrderEvent {
    ///     order_id: String,
    ///     amount: f64,
    /// }
    ///
    /// let message = OutboundMessage::from_json(&order)?.with_key(order.order_id.clone());
    /// ```
    pub fn from_json<T: Serialize>(data: T) -> ConnectorResult<Self> {
        let value =
            serde_json::to_vec(&data).map_err(|e| ConnectorError::Serialization(e.to_string()))?;
        Ok(Self::new(value))
    }

    /// Add a header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the record key (partition selection / grouping)
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Payload as text, if it is valid UTF-8
    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}
