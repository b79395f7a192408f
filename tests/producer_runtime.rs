//! Integration test for the producer runtime's startup sequence
//!
//! Identity problems must stop the runtime before the message source is initialized or any
//! Kafka client is built, even when bootstrap servers are configured statically.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use msk_connect_core::{
    BootstrapSettings, ConnectorConfig, ConnectorError, ConnectorResult, CredentialError,
    CredentialProvider, IdentitySettings, MessageSource, OutboundMessage, ProducerRuntime,
    SessionCredential, TokenError, TopicSettings,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct RejectingBroker;

#[async_trait]
impl CredentialProvider for RejectingBroker {
    async fn acquire_session_credential(&self) -> Result<SessionCredential, CredentialError> {
        Err(CredentialError::Rejected {
            code: "InvalidClientTokenId".into(),
            message: "The security token included in the request is invalid".into(),
        })
    }
}

/// Hands out a credential that expired a minute ago
struct ExpiredBroker;

#[async_trait]
impl CredentialProvider for ExpiredBroker {
    async fn acquire_session_credential(&self) -> Result<SessionCredential, CredentialError> {
        Ok(SessionCredential::new(
            "ASIAEXAMPLE",
            "secret",
            "session-token",
            Utc::now() - ChronoDuration::minutes(1),
        ))
    }
}

struct TrackingSource {
    initialized: Arc<AtomicBool>,
}

#[async_trait]
impl MessageSource for TrackingSource {
    async fn initialize(&mut self, _config: &ConnectorConfig) -> ConnectorResult<()> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn next_message(&mut self) -> ConnectorResult<Option<OutboundMessage>> {
        Ok(Some(OutboundMessage::from_string("unused")))
    }
}

fn static_bootstrap_config() -> ConnectorConfig {
    ConnectorConfig {
        connector_name: "orders-producer".to_string(),
        identity: IdentitySettings {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
        },
        region: "us-east-1".to_string(),
        topic: TopicSettings {
            name: "orders-v1".to_string(),
            ..TopicSettings::default()
        },
        bootstrap: BootstrapSettings {
            servers: Some("b-1.demo.kafka.us-east-1.amazonaws.com:9098".to_string()),
            ..BootstrapSettings::default()
        },
        ..ConnectorConfig::default()
    }
}

#[tokio::test]
async fn test_rejected_identity_stops_startup_with_static_bootstrap() {
    let initialized = Arc::new(AtomicBool::new(false));
    let source = TrackingSource {
        initialized: initialized.clone(),
    };
    let runtime = ProducerRuntime::with_credential_provider(
        source,
        static_bootstrap_config(),
        Arc::new(RejectingBroker),
    )
    .unwrap();

    let err = runtime.run().await.unwrap_err();

    assert!(matches!(
        err,
        ConnectorError::Credential(CredentialError::Rejected { .. })
    ));
    assert!(err.is_fatal());
    assert!(!initialized.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_expired_credential_stops_startup() {
    let initialized = Arc::new(AtomicBool::new(false));
    let source = TrackingSource {
        initialized: initialized.clone(),
    };
    let runtime = ProducerRuntime::with_credential_provider(
        source,
        static_bootstrap_config(),
        Arc::new(ExpiredBroker),
    )
    .unwrap();

    let err = runtime.run().await.unwrap_err();

    assert!(matches!(
        err,
        ConnectorError::Token(TokenError::ExpiredCredential { .. })
    ));
    assert!(!initialized.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_cancellation_token_released_after_failed_startup() {
    let runtime = ProducerRuntime::with_credential_provider(
        TrackingSource {
            initialized: Arc::new(AtomicBool::new(false)),
        },
        static_bootstrap_config(),
        Arc::new(RejectingBroker),
    )
    .unwrap();
    let token = runtime.cancellation_token();

    assert!(runtime.run().await.is_err());
    assert!(token.is_cancelled());
}
