//! Producer Runtime for caller content → MSK connectors
//!
//! Wires the startup sequence (credential, discovery, auth, provisioning) and then hands the
//! producer to the publish loop.

use super::publish_loop::{PublishLoop, PublishSummary};
use crate::{
    provision_topic, sign_token, AuthCallbackAdapter, AuthClientContext, ClusterEndpoint,
    ConnectorConfig, ConnectorError, ConnectorMetrics, ConnectorResult, CredentialProvider,
    KafkaRecordProducer, KafkaTopicAdmin, MessageSource, MskBootstrapResolver, SessionCredential,
    StsCredentialBroker, TokenGenerator,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Runtime for producer connectors (caller content → MSK)
///
/// Create with `ProducerRuntime::new()` and run with `.run().await`. Ctrl-C cancels the
/// publish loop; embedders can cancel through `cancellation_token()` as well.
pub struct ProducerRuntime<S: MessageSource> {
    source: S,
    config: ConnectorConfig,
    credentials: Arc<dyn CredentialProvider>,
    metrics: Arc<ConnectorMetrics>,
    shutdown: CancellationToken,
}

impl<S: MessageSource> ProducerRuntime<S> {
    /// Create a new producer runtime backed by AWS STS
    pub fn new(source: S, config: ConnectorConfig) -> ConnectorResult<Self> {
        let credentials: Arc<dyn CredentialProvider> =
            Arc::new(StsCredentialBroker::from_config(&config));
        Self::with_credential_provider(source, config, credentials)
    }

    /// Create a runtime with a custom session credential source
    pub fn with_credential_provider(
        source: S,
        config: ConnectorConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> ConnectorResult<Self> {
        // Validate configuration
        config.validate()?;

        // Initialize tracing
        Self::init_tracing(&config);

        info!("Initializing Producer Runtime");
        info!("Connector: {}", config.connector_name);
        info!("Topic: {}", config.topic.name);

        let metrics = Arc::new(ConnectorMetrics::new(
            &config.connector_name,
            &config.topic.name,
        ));

        Ok(Self {
            source,
            config,
            credentials,
            metrics,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that stops the publish loop when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the connector until cancelled
    pub async fn run(self) -> ConnectorResult<PublishSummary> {
        info!("Starting Producer Runtime");

        // Setup shutdown handler
        self.setup_shutdown_handler();

        let shutdown = self.shutdown.clone();
        let result = self.start_and_publish().await;
        // Releases the signal listener
        shutdown.cancel();

        let summary = result?;
        info!("Producer Runtime stopped");
        Ok(summary)
    }

    async fn start_and_publish(mut self) -> ConnectorResult<PublishSummary> {
        // A rejected identity stops startup before any client is built
        let credential = self
            .credentials
            .acquire_session_credential()
            .await
            .map_err(ConnectorError::Credential)?;
        let preflight = sign_token(&credential, &self.config.region, Utc::now())?;
        debug!(
            expires_at_ms = preflight.expiry_timestamp_millis(),
            "Session credential accepted"
        );

        // Initialize the message source
        self.source.initialize(&self.config).await?;

        let endpoint = self.resolve_endpoint(&credential).await?;
        let context = self.auth_context();

        {
            let admin = KafkaTopicAdmin::create(&endpoint, &self.config, context.clone())?;
            provision_topic(&admin, &self.config, &self.metrics).await?;
        }

        let producer = Arc::new(KafkaRecordProducer::create(
            &endpoint,
            &self.config,
            context,
        )?);
        info!(bootstrap = endpoint.bootstrap_servers(), "Producer created");
        self.metrics.set_health(true);

        PublishLoop::new(
            self.config.topic.name.clone(),
            self.source,
            producer,
            self.metrics.clone(),
        )
        .with_policy(self.config.failure_policy())
        .with_failure_threshold(self.config.processing.failure_threshold)
        .with_poll_interval(self.config.processing.poll_interval())
        .with_flush_timeout(self.config.processing.produce_timeout())
        .run(self.shutdown.clone())
        .await
    }

    /// Setup shutdown signal handler for SIGTERM/SIGINT
    fn setup_shutdown_handler(&self) {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        error!("Failed to listen for ctrl-c: {}", e);
                        return;
                    }
                    info!("Received shutdown signal");
                    shutdown.cancel();
                }
                _ = shutdown.cancelled() => {}
            }
        });
    }

    /// Static bootstrap servers, or discovery through the MSK control plane
    async fn resolve_endpoint(
        &self,
        credential: &SessionCredential,
    ) -> ConnectorResult<ClusterEndpoint> {
        if let Some(endpoint) = crate::static_endpoint(&self.config) {
            info!(
                bootstrap = endpoint.bootstrap_servers(),
                "Using configured bootstrap servers"
            );
            return Ok(endpoint);
        }

        MskBootstrapResolver::from_config(&self.config)
            .resolve(credential)
            .await
    }

    fn auth_context(&self) -> AuthClientContext {
        let generator = Arc::new(TokenGenerator::new(
            self.credentials.clone(),
            self.config.region.clone(),
        ));
        let adapter = AuthCallbackAdapter::new(
            generator,
            Handle::current(),
            self.config.credentials.token_refresh_timeout(),
        )
        .with_metrics(self.metrics.clone());

        let principal = if self.config.credentials.principal_name.is_empty() {
            self.config.connector_name.clone()
        } else {
            self.config.credentials.principal_name.clone()
        };
        AuthClientContext::new(Arc::new(adapter), principal)
    }

    /// Initialize tracing/logging
    fn init_tracing(config: &ConnectorConfig) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.processing.log_level));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .ok(); // Ignore if already initialized
    }
}
