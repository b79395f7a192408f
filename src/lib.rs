//! # MSK Connect Core
//!
//! Core SDK for building producers that publish to Amazon MSK with IAM authentication.
//!
//! This library handles everything between "I have a payload" and "the broker acknowledged
//! it": exchanging a static identity for a short-lived session credential, deriving signed
//! OAUTHBEARER tokens whenever the Kafka client asks for one, discovering the cluster's
//! bootstrap brokers, making sure the target topic exists, and running a cancellable publish
//! loop with per-record correlation ids.
//!
//! ## Overview
//!
//! Startup runs once, in order:
//! 1. **Credential**: STS `GetSessionToken` for the configured identity
//! 2. **Discovery**: MSK `GetBootstrapBrokers` (or static bootstrap servers)
//! 3. **Provisioning**: create the topic unless cluster metadata already lists it
//! 4. **Publish loop**: one record per iteration until cancelled
//!
//! Token refresh runs concurrently, on the Kafka client's own thread, through
//! `AuthCallbackAdapter`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use msk_connect_core::{
//!     ConnectorConfig, ConnectorResult, MessageSource, OutboundMessage, ProducerRuntime,
//! };
//! use async_trait::async_trait;
//!
//! pub struct Heartbeat;
//!
//! #[async_trait]
//! impl MessageSource for Heartbeat {
//!     async fn next_message(&mut self) -> ConnectorResult<Option<OutboundMessage>> {
//!         Ok(Some(OutboundMessage::from_string("alive")))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> ConnectorResult<()> {
//!     let config = ConnectorConfig::from_env()?;
//!     let runtime = ProducerRuntime::new(Heartbeat, config)?;
//!     let summary = runtime.run().await?;
//!     println!("delivered {} records", summary.delivered);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **IAM authentication**: SigV4-presigned `kafka-cluster:Connect` bearer tokens, refreshed on demand
//! - **Idempotent provisioning**: concurrent creators converge, "already exists" is success
//! - **Failure policy**: continue, retry with backoff, or fail fast, plus a consecutive-failure signal
//! - **Observability**: structured logging, metrics and health tracking
//! - **Configuration**: environment variable and file-based configuration

mod auth;
mod config;
mod credentials;
mod discovery;
mod error;
mod kafka;
mod message;
mod metrics;
mod provisioner;
mod retry;
mod runtime;
mod token;
mod traits;
pub mod utils;

// Re-export public API
pub use auth::{AuthCallbackAdapter, AuthClientContext, RefreshOutcome, TokenSink};
pub use config::{
    BootstrapAccess, BootstrapSettings, ConnectorConfig, CredentialSettings, FailurePolicyKind,
    IdentitySettings, ProcessingSettings, RetrySettings, TopicSettings,
};
pub use credentials::{CredentialProvider, SessionCredential, StsCredentialBroker};
pub use discovery::{static_endpoint, ClusterEndpoint, MskBootstrapResolver};
pub use error::{
    ConnectorError, ConnectorResult, CredentialError, DeliveryError, TokenError,
    TopicProvisionError,
};
pub use kafka::{client_config, KafkaRecordProducer, KafkaTopicAdmin};
pub use message::{DeliveryOutcome, OutboundMessage, ProduceRecord, CORRELATION_ID_HEADER};
pub use metrics::ConnectorMetrics;
pub use provisioner::{
    provision_topic, ProvisionOutcome, ProvisionState, TopicProvisioner, TopicSpec,
};
pub use retry::{FailurePolicy, RetryStrategy};
pub use runtime::{ProducerRuntime, PublishAttempt, PublishLoop, PublishSummary, StopReason};
pub use token::{sign_token, BearerToken, Clock, SystemClock, TokenGenerator, TOKEN_VALIDITY_SECS};
pub use traits::{CreateTopicError, MessageSource, RecordProducer, StaticMessageSource, TopicAdmin};
pub use utils::{HealthChecker, HealthStatus};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
