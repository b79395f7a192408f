//! Error taxonomy: one enum per concern plus the crate-level `ConnectorError`.

use thiserror::Error;

/// Result alias used by every fallible public entry point
///
/// **Mandatory public API** - all runtime entry points return this.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Failures of the identity service exchange (session credential acquisition).
///
/// Fatal at startup. No retry is attempted at this layer, callers decide the policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// The identity service refused the request (bad identity, expired keys, denied)
    #[error("identity service rejected the request ({code}): {message}")]
    Rejected { code: String, message: String },

    /// The identity service is throttling us
    #[error("identity service throttled the request: {0}")]
    Throttled(String),

    /// Network failure, timeout or malformed response
    #[error("identity service unreachable: {0}")]
    Unreachable(String),

    /// The response did not carry a usable credential
    #[error("identity service returned no credentials: {0}")]
    MissingCredentials(String),
}

/// Failures while deriving a bearer token.
///
/// Reported to the Kafka client through the failure path of the auth callback. Recoverable,
/// the client invokes the callback again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("credential acquisition failed: {0}")]
    Credential(#[from] CredentialError),

    /// The supplied session credential expired before the token could be derived
    #[error("session credential expired at {expired_at_ms} (now {now_ms})")]
    ExpiredCredential { expired_at_ms: i64, now_ms: i64 },

    #[error("token signing failed: {0}")]
    Signing(String),

    /// The derivation did not finish within the refresh bound
    #[error("token refresh timed out after {0} ms")]
    Timeout(u64),

    /// The dedicated refresh worker could not be started or died
    #[error("token refresh worker failed: {0}")]
    Worker(String),
}

/// Failures of the topic provisioner.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicProvisionError {
    /// Cluster metadata could not be fetched, the topic state is unknown
    #[error("failed to fetch cluster metadata: {0}")]
    Metadata(String),

    /// The broker refused the create request for a reason other than "already exists"
    #[error("failed to create topic {topic}: {reason}")]
    CreateFailed { topic: String, reason: String },
}

/// Per-record delivery failure reported by the broker or the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("delivery failed [{code}]: {message}")]
pub struct DeliveryError {
    /// Broker/client error code name (e.g. `MsgTimedOut`, `TopicAuthorizationFailed`)
    pub code: String,
    /// Human readable reason
    pub message: String,
}

impl DeliveryError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Crate-level error returned by the runtime, configuration and message sources
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Transient: a later attempt may succeed (timeouts, throttling, broker hiccups)
    #[error("Retryable error: {message}")]
    Retryable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Permanent until the operator intervenes (identity rejected, cluster not
    /// discoverable, metadata unavailable)
    #[error("Fatal error: {message}")]
    Fatal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid or incomplete configuration, detected before anything connects
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Topic provisioning error: {0}")]
    TopicProvision(#[from] TopicProvisionError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Kafka client error
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// Payload encoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectorError {
    /// True for transient failures
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectorError::Retryable { .. }
                | ConnectorError::Token(_)
                | ConnectorError::Delivery(_)
                | ConnectorError::Credential(CredentialError::Throttled(_))
                | ConnectorError::Credential(CredentialError::Unreachable(_))
        )
    }

    /// True for failures that should stop the process
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConnectorError::Fatal { .. }
                | ConnectorError::Configuration(_)
                | ConnectorError::Kafka(rdkafka::error::KafkaError::ClientCreation(_))
                | ConnectorError::Credential(CredentialError::Rejected { .. })
                | ConnectorError::TopicProvision(TopicProvisionError::Metadata(_))
        )
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        ConnectorError::Retryable {
            message: message.into(),
            source: None,
        }
    }

    pub fn retryable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::Retryable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        ConnectorError::Fatal {
            message: message.into(),
            source: None,
        }
    }

    pub fn fatal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::Fatal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        ConnectorError::Configuration(message.into())
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(err: serde_json::Error) -> Self {
        ConnectorError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let retryable = ConnectorError::retryable("network timeout");
        assert!(retryable.is_retryable());
        assert!(!retryable.is_fatal());

        let fatal = ConnectorError::fatal("cluster not found");
        assert!(!fatal.is_retryable());
        assert!(fatal.is_fatal());

        let rejected: ConnectorError = CredentialError::Rejected {
            code: "InvalidClientTokenId".into(),
            message: "bad key".into(),
        }
        .into();
        assert!(rejected.is_fatal());

        let throttled: ConnectorError = CredentialError::Throttled("slow down".into()).into();
        assert!(throttled.is_retryable());

        let delivery: ConnectorError = DeliveryError::new("MsgTimedOut", "timed out").into();
        assert!(delivery.is_retryable());

        let client: ConnectorError = rdkafka::error::KafkaError::ClientCreation(
            "No provider for SASL mechanism OAUTHBEARER".into(),
        )
        .into();
        assert!(client.is_fatal());

        let expired: ConnectorError = TokenError::ExpiredCredential {
            expired_at_ms: 1,
            now_ms: 2,
        }
        .into();
        assert!(expired.is_retryable());
        assert!(!expired.is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = ConnectorError::retryable("test error");
        assert_eq!(err.to_string(), "Retryable error: test error");

        let err = DeliveryError::new("TopicAuthorizationFailed", "not allowed");
        assert_eq!(
            err.to_string(),
            "delivery failed [TopicAuthorizationFailed]: not allowed"
        );
    }

    #[test]
    fn test_token_error_wraps_credential_error() {
        let token_err: TokenError = CredentialError::Unreachable("dns".into()).into();
        assert!(matches!(
            token_err,
            TokenError::Credential(CredentialError::Unreachable(_))
        ));
        assert!(token_err.to_string().contains("dns"));
    }
}
