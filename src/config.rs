//! Configuration management for connectors.

use crate::retry::{FailurePolicy, RetryStrategy};
use crate::{ConnectorError, ConnectorResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

/// Main configuration for connectors
///
/// Loaded once at process start and immutable afterwards.
///
/// # Structure
/// - **Mandatory fields** (from environment): identity, `cluster_arn`, `topic.name`
/// - **Optional fields** (from config file or defaults): `credentials`, `bootstrap`,
///   `retry`, `processing`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Connector name, used for metric labels and the Kafka `client.id`
    #[serde(default = "default_connector_name")]
    pub connector_name: String,

    /// Long-lived identity exchanged for session credentials
    pub identity: IdentitySettings,

    /// ARN of the MSK cluster, used for bootstrap discovery
    #[serde(default)]
    pub cluster_arn: String,

    /// AWS region of the cluster (also the signing region of the bearer token)
    #[serde(default = "default_region")]
    pub region: String,

    /// Target topic
    pub topic: TopicSettings,

    #[serde(default)]
    pub credentials: CredentialSettings,

    #[serde(default)]
    pub bootstrap: BootstrapSettings,

    /// Retry settings (optional, from config file or defaults)
    #[serde(default)]
    pub retry: RetrySettings,

    /// Processing and runtime settings (optional, from config file or defaults)
    #[serde(default)]
    pub processing: ProcessingSettings,
}

fn default_connector_name() -> String {
    "msk-connector".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}

impl ConnectorConfig {
    /// Load mandatory configuration from environment variables
    ///
    /// Reads:
    /// - `MSK_ACCESS_KEY_ID`, `MSK_SECRET_ACCESS_KEY`: identity (required)
    /// - `MSK_TOPIC`: target topic (required)
    /// - `MSK_CLUSTER_ARN`: cluster (required unless `MSK_BOOTSTRAP_SERVERS` is set)
    /// - `MSK_REGION`, `MSK_BOOTSTRAP_SERVERS`, `CONNECTOR_NAME`: optional
    ///
    /// Everything else uses defaults.
    pub fn from_env() -> ConnectorResult<Self> {
        let access_key_id = env::var("MSK_ACCESS_KEY_ID")
            .map_err(|_| ConnectorError::config("MSK_ACCESS_KEY_ID is required"))?;
        let secret_access_key = env::var("MSK_SECRET_ACCESS_KEY")
            .map_err(|_| ConnectorError::config("MSK_SECRET_ACCESS_KEY is required"))?;
        let topic = env::var("MSK_TOPIC")
            .map_err(|_| ConnectorError::config("MSK_TOPIC is required"))?;

        let mut config = Self {
            identity: IdentitySettings {
                access_key_id,
                secret_access_key,
            },
            topic: TopicSettings {
                name: topic,
                ..TopicSettings::default()
            },
            ..Self::default()
        };
        config.apply_env_overrides();

        if config.cluster_arn.is_empty() && config.bootstrap.servers.is_none() {
            return Err(ConnectorError::config(
                "MSK_CLUSTER_ARN is required when MSK_BOOTSTRAP_SERVERS is not set",
            ));
        }

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> ConnectorResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            let message = format!("Failed to read config file {}: {}", path, e);
            std::io::Error::new(e.kind(), message)
        })?;

        Self::from_toml_str(&content)
            .map_err(|e| ConnectorError::config(format!("Invalid config file {}: {}", path, e)))
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> ConnectorResult<Self> {
        toml::from_str(content)
            .map_err(|e| ConnectorError::config(format!("Failed to parse config: {}", e)))
    }

    /// Apply environment variable overrides
    ///
    /// Only identity, cluster, region, topic name and bootstrap servers can be overridden.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("MSK_ACCESS_KEY_ID") {
            self.identity.access_key_id = val;
        }
        if let Ok(val) = env::var("MSK_SECRET_ACCESS_KEY") {
            self.identity.secret_access_key = val;
        }
        if let Ok(val) = env::var("MSK_CLUSTER_ARN") {
            self.cluster_arn = val;
        }
        if let Ok(val) = env::var("MSK_REGION") {
            self.region = val;
        }
        if let Ok(val) = env::var("MSK_TOPIC") {
            self.topic.name = val;
        }
        if let Ok(val) = env::var("MSK_BOOTSTRAP_SERVERS") {
            self.bootstrap.servers = Some(val);
        }
        if let Ok(val) = env::var("CONNECTOR_NAME") {
            self.connector_name = val;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.connector_name.is_empty() {
            return Err(ConnectorError::config("connector_name cannot be empty"));
        }

        if self.identity.access_key_id.is_empty() || self.identity.secret_access_key.is_empty()
        {
            return Err(ConnectorError::config(
                "identity.access_key_id and identity.secret_access_key are required",
            ));
        }

        if self.region.is_empty() {
            return Err(ConnectorError::config("region cannot be empty"));
        }

        let has_static_servers = self
            .bootstrap
            .servers
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        if self.cluster_arn.is_empty() && !has_static_servers {
            return Err(ConnectorError::config(
                "either cluster_arn or bootstrap.servers must be set",
            ));
        }

        self.topic.validate()?;

        // STS GetSessionToken accepts 15 minutes to 36 hours
        if !(900..=129_600).contains(&self.credentials.session_duration_secs) {
            return Err(ConnectorError::config(
                "credentials.session_duration_secs must be between 900 and 129600",
            ));
        }

        if self.credentials.token_refresh_timeout_ms == 0 {
            return Err(ConnectorError::config(
                "credentials.token_refresh_timeout_ms must be > 0",
            ));
        }

        if self.retry.max_retries > 100 {
            return Err(ConnectorError::config("max_retries too high (max 100)"));
        }

        if self.processing.metadata_timeout_ms == 0 {
            return Err(ConnectorError::config("metadata_timeout_ms must be > 0"));
        }

        if self.processing.failure_threshold == 0 {
            return Err(ConnectorError::config("failure_threshold must be > 0"));
        }

        Ok(())
    }

    /// Topic declaration derived from the configuration
    pub fn topic_spec(&self) -> crate::TopicSpec {
        crate::TopicSpec::new(
            self.topic.name.clone(),
            self.topic.partitions,
            self.topic.replication_factor,
        )
    }

    /// Failure policy for the publish loop
    pub fn failure_policy(&self) -> FailurePolicy {
        match self.processing.failure_policy {
            FailurePolicyKind::Continue => FailurePolicy::Continue,
            FailurePolicyKind::FailFast => FailurePolicy::FailFast,
            FailurePolicyKind::Retry => FailurePolicy::RetryWithBackoff(RetryStrategy::from_settings(
                &self.retry,
            )),
        }
    }
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            connector_name: default_connector_name(),
            identity: IdentitySettings::default(),
            cluster_arn: String::new(),
            region: default_region(),
            topic: TopicSettings::default(),
            credentials: CredentialSettings::default(),
            bootstrap: BootstrapSettings::default(),
            retry: RetrySettings::default(),
            processing: ProcessingSettings::default(),
        }
    }
}

/// Static identity material supplied at process start
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct IdentitySettings {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for IdentitySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentitySettings")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Target topic declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSettings {
    pub name: String,

    #[serde(default = "default_partitions")]
    pub partitions: i32,

    #[serde(default = "default_replication_factor")]
    pub replication_factor: i32,
}

fn default_partitions() -> i32 {
    1
}
fn default_replication_factor() -> i32 {
    2
}

impl TopicSettings {
    fn validate(&self) -> ConnectorResult<()> {
        if self.name.is_empty() {
            return Err(ConnectorError::config("topic.name cannot be empty"));
        }
        if self.partitions <= 0 {
            return Err(ConnectorError::config("topic.partitions must be > 0"));
        }
        if self.replication_factor <= 0 {
            return Err(ConnectorError::config(
                "topic.replication_factor must be > 0",
            ));
        }
        Ok(())
    }
}

impl Default for TopicSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            partitions: default_partitions(),
            replication_factor: default_replication_factor(),
        }
    }
}

/// Session credential and bearer token settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSettings {
    /// Lifetime requested for each session credential
    #[serde(default = "default_session_duration_secs")]
    pub session_duration_secs: i32,

    /// Upper bound for one token refresh (credential exchange + signing)
    #[serde(default = "default_token_refresh_timeout_ms")]
    pub token_refresh_timeout_ms: u64,

    /// Principal reported alongside the token
    #[serde(default)]
    pub principal_name: String,
}

fn default_session_duration_secs() -> i32 {
    7200
}
fn default_token_refresh_timeout_ms() -> u64 {
    10_000
}

impl CredentialSettings {
    pub fn token_refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.token_refresh_timeout_ms)
    }
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            session_duration_secs: default_session_duration_secs(),
            token_refresh_timeout_ms: default_token_refresh_timeout_ms(),
            principal_name: String::new(),
        }
    }
}

/// Which MSK listener the discovered bootstrap string points at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapAccess {
    /// Public endpoints with SASL/IAM
    #[default]
    Public,
    /// VPC-private endpoints with SASL/IAM
    Private,
}

/// Broker bootstrap settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapSettings {
    /// Static bootstrap servers; when set, cluster discovery is skipped
    #[serde(default)]
    pub servers: Option<String>,

    #[serde(default)]
    pub access: BootstrapAccess,

    /// Extra librdkafka properties applied to admin and producer clients
    #[serde(default)]
    pub client_overrides: HashMap<String, String>,
}

/// Retry configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum number of retries for a failed publish
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff duration in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    1000
}
fn default_max_backoff_ms() -> u64 {
    30000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 1000,
            max_backoff_ms: 30000,
        }
    }
}

/// What the publish loop does after a failed record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicyKind {
    /// Log and move on to the next record
    #[default]
    Continue,
    /// Retry the same record with exponential backoff (see `retry`)
    Retry,
    /// Stop the loop on the first failure
    FailFast,
}

/// Processing and runtime configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingSettings {
    /// Sleep between polls when the message source has nothing to send
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Bound for the cluster metadata fetch
    #[serde(default = "default_metadata_timeout_ms")]
    pub metadata_timeout_ms: u64,

    /// Producer queue/delivery timeout for one record
    #[serde(default = "default_produce_timeout_ms")]
    pub produce_timeout_ms: u64,

    /// Consecutive failures before the loop reports itself unhealthy
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,

    #[serde(default)]
    pub failure_policy: FailurePolicyKind,

    /// Abort startup when topic creation fails (other than "already exists")
    #[serde(default)]
    pub fail_on_provision_error: bool,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_poll_interval_ms() -> u64 {
    100
}
fn default_metadata_timeout_ms() -> u64 {
    10_000
}
fn default_produce_timeout_ms() -> u64 {
    30_000
}
fn default_failure_threshold() -> usize {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

impl ProcessingSettings {
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    pub fn produce_timeout(&self) -> Duration {
        Duration::from_millis(self.produce_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            metadata_timeout_ms: default_metadata_timeout_ms(),
            produce_timeout_ms: default_produce_timeout_ms(),
            failure_threshold: default_failure_threshold(),
            failure_policy: FailurePolicyKind::default(),
            fail_on_provision_error: false,
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ConnectorConfig {
        ConnectorConfig {
            identity: IdentitySettings {
                access_key_id: "AKIDEXAMPLE".into(),
                secret_access_key: "secret".into(),
            },
            cluster_arn: "arn:aws:kafka:us-east-1:123456789012:cluster/demo/abc".into(),
            topic: TopicSettings {
                name: "orders-v1".into(),
                partitions: 3,
                replication_factor: 2,
            },
            ..ConnectorConfig::default()
        }
    }

    #[test]
    fn test_config_default() {
        let config = ConnectorConfig::default();
        assert_eq!(config.connector_name, "msk-connector");
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.credentials.session_duration_secs, 7200);
        assert_eq!(config.processing.metadata_timeout_ms, 10_000);
        assert_eq!(config.processing.failure_policy, FailurePolicyKind::Continue);
        assert_eq!(config.bootstrap.access, BootstrapAccess::Public);
    }

    #[test]
    fn test_config_validation() {
        let mut config = valid_config();
        assert!(config.validate().is_ok());

        config.topic.partitions = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.cluster_arn.clear();
        assert!(config.validate().is_err());
        config.bootstrap.servers = Some("b-1.demo:9198".into());
        assert!(config.validate().is_ok());

        let mut config = valid_config();
        config.credentials.session_duration_secs = 60;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.identity.secret_access_key.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_identity_debug_redacts_secret() {
        let config = valid_config();
        let rendered = format!("{:?}", config.identity);
        assert!(rendered.contains("AKIDEXAMPLE"));
        assert!(!rendered.contains("secret\""));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_failure_policy_mapping() {
        let mut config = valid_config();
        assert!(matches!(config.failure_policy(), FailurePolicy::Continue));

        config.processing.failure_policy = FailurePolicyKind::FailFast;
        assert!(matches!(config.failure_policy(), FailurePolicy::FailFast));

        config.processing.failure_policy = FailurePolicyKind::Retry;
        assert!(matches!(
            config.failure_policy(),
            FailurePolicy::RetryWithBackoff(_)
        ));
    }
}
