//! Bootstrap broker discovery.
//!
//! Discovery runs once at startup and yields an immutable `ClusterEndpoint` that is handed to
//! the admin and producer constructors.

use crate::credentials::classify_sdk_error;
use crate::{BootstrapAccess, ConnectorConfig, ConnectorError, ConnectorResult, SessionCredential};
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use tracing::info;

/// Where to reach the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEndpoint {
    bootstrap_servers: String,
}

impl ClusterEndpoint {
    pub fn new(bootstrap_servers: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
        }
    }

    /// Comma separated `host:port` list
    pub fn bootstrap_servers(&self) -> &str {
        &self.bootstrap_servers
    }
}

/// Resolves the cluster's SASL/IAM bootstrap string through the MSK control plane
pub struct MskBootstrapResolver {
    cluster_arn: String,
    region: String,
    access: BootstrapAccess,
}

impl MskBootstrapResolver {
    pub fn new(cluster_arn: impl Into<String>, region: impl Into<String>, access: BootstrapAccess) -> Self {
        Self {
            cluster_arn: cluster_arn.into(),
            region: region.into(),
            access,
        }
    }

    pub fn from_config(config: &ConnectorConfig) -> Self {
        Self::new(
            config.cluster_arn.clone(),
            config.region.clone(),
            config.bootstrap.access,
        )
    }

    /// Look up the bootstrap brokers using `credential` for the control-plane call
    pub async fn resolve(&self, credential: &SessionCredential) -> ConnectorResult<ClusterEndpoint> {
        let session = Credentials::new(
            credential.access_key_id(),
            credential.secret_access_key(),
            Some(credential.session_token().to_string()),
            Some(credential.expiry().into()),
            "msk-connect-session",
        );
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(self.region.clone()))
            .credentials_provider(session)
            .load()
            .await;
        let client = aws_sdk_kafka::Client::new(&sdk_config);

        let response = client
            .get_bootstrap_brokers()
            .cluster_arn(&self.cluster_arn)
            .send()
            .await
            .map_err(|e| {
                ConnectorError::fatal_with_source(
                    format!("Failed to discover bootstrap brokers for {}", self.cluster_arn),
                    classify_sdk_error(e),
                )
            })?;

        let servers = match self.access {
            BootstrapAccess::Public => response.bootstrap_broker_string_public_sasl_iam(),
            BootstrapAccess::Private => response.bootstrap_broker_string_sasl_iam(),
        };

        let servers = servers.filter(|s| !s.is_empty()).ok_or_else(|| {
            ConnectorError::fatal(format!(
                "Cluster {} exposes no {:?} SASL/IAM listener",
                self.cluster_arn, self.access
            ))
        })?;

        info!(cluster = %self.cluster_arn, bootstrap = servers, "discovered bootstrap brokers");
        Ok(ClusterEndpoint::new(servers))
    }
}

/// Static endpoint from configuration, if one is set
pub fn static_endpoint(config: &ConnectorConfig) -> Option<ClusterEndpoint> {
    config
        .bootstrap
        .servers
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ClusterEndpoint::new)
}
