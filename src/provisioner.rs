//! Topic provisioning.
//!
//! `Unverified → Verified`, reached either by finding the topic in cluster metadata or by
//! creating it. Creation is attempted at most once per provisioner; "already exists" from the
//! broker counts as success.

use crate::{
    ConnectorConfig, ConnectorError, ConnectorMetrics, ConnectorResult, CreateTopicError,
    TopicAdmin, TopicProvisionError,
};
use std::time::Duration;
use tracing::{error, info, warn};

/// Topic declaration from configuration. Write-once: created or left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partition_count: i32,
    pub replication_factor: i32,
}

impl TopicSpec {
    pub fn new(name: impl Into<String>, partition_count: i32, replication_factor: i32) -> Self {
        Self {
            name: name.into(),
            partition_count,
            replication_factor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionState {
    Unverified,
    Verified,
}

/// How the topic came to be verified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Listed in cluster metadata (or verified by an earlier run)
    AlreadyPresent,
    /// Created by this provisioner
    Created,
    /// The create raced with another provisioner that won
    CreatedConcurrently,
}

pub struct TopicProvisioner {
    spec: TopicSpec,
    metadata_timeout: Duration,
    state: ProvisionState,
    create_attempted: bool,
}

impl TopicProvisioner {
    pub fn new(spec: TopicSpec, metadata_timeout: Duration) -> Self {
        Self {
            spec,
            metadata_timeout,
            state: ProvisionState::Unverified,
            create_attempted: false,
        }
    }

    pub fn state(&self) -> ProvisionState {
        self.state
    }

    pub fn spec(&self) -> &TopicSpec {
        &self.spec
    }

    /// Make sure the configured topic exists
    ///
    /// A failed metadata fetch leaves the provisioner `Unverified` and may be retried. A failed
    /// create also leaves it `Unverified`, but no further create is issued by this instance.
    pub async fn ensure_topic<A: TopicAdmin + ?Sized>(
        &mut self,
        admin: &A,
    ) -> Result<ProvisionOutcome, TopicProvisionError> {
        if self.state == ProvisionState::Verified {
            return Ok(ProvisionOutcome::AlreadyPresent);
        }

        let topics = admin
            .fetch_topic_names(self.metadata_timeout)
            .await
            .map_err(TopicProvisionError::Metadata)?;

        if topics.iter().any(|name| name == &self.spec.name) {
            info!(topic = %self.spec.name, "topic already exists");
            self.state = ProvisionState::Verified;
            return Ok(ProvisionOutcome::AlreadyPresent);
        }

        if self.create_attempted {
            return Err(TopicProvisionError::CreateFailed {
                topic: self.spec.name.clone(),
                reason: "topic still missing and creation was already attempted".to_string(),
            });
        }
        self.create_attempted = true;

        info!(
            topic = %self.spec.name,
            partitions = self.spec.partition_count,
            replication_factor = self.spec.replication_factor,
            "creating topic"
        );

        match admin.create_topic(&self.spec).await {
            Ok(()) => {
                info!(topic = %self.spec.name, "topic created");
                self.state = ProvisionState::Verified;
                Ok(ProvisionOutcome::Created)
            }
            Err(CreateTopicError::AlreadyExists) => {
                info!(topic = %self.spec.name, "topic was created concurrently");
                self.state = ProvisionState::Verified;
                Ok(ProvisionOutcome::CreatedConcurrently)
            }
            Err(CreateTopicError::Other(reason)) => {
                error!(topic = %self.spec.name, reason = %reason, "topic creation failed");
                Err(TopicProvisionError::CreateFailed {
                    topic: self.spec.name.clone(),
                    reason,
                })
            }
        }
    }
}

/// Startup provisioning for the configured topic
///
/// A metadata failure aborts startup. A failed create is logged and startup continues with
/// `Ok(None)`, unless `processing.fail_on_provision_error` is set.
pub async fn provision_topic<A: TopicAdmin + ?Sized>(
    admin: &A,
    config: &ConnectorConfig,
    metrics: &ConnectorMetrics,
) -> ConnectorResult<Option<ProvisionOutcome>> {
    let mut provisioner =
        TopicProvisioner::new(config.topic_spec(), config.processing.metadata_timeout());

    match provisioner.ensure_topic(admin).await {
        Ok(outcome) => {
            let label = match outcome {
                ProvisionOutcome::AlreadyPresent => "already_present",
                ProvisionOutcome::Created => "created",
                ProvisionOutcome::CreatedConcurrently => "created_concurrently",
            };
            metrics.record_provisioning(label);
            Ok(Some(outcome))
        }
        Err(e @ TopicProvisionError::Metadata(_)) => {
            metrics.record_provisioning("metadata_failed");
            Err(ConnectorError::TopicProvision(e))
        }
        Err(e @ TopicProvisionError::CreateFailed { .. }) => {
            metrics.record_provisioning("create_failed");
            if config.processing.fail_on_provision_error {
                return Err(ConnectorError::TopicProvision(e));
            }
            warn!(error = %e, "Continuing without a verified topic");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeAdmin {
        topics: Mutex<Vec<String>>,
        creates: Mutex<Vec<TopicSpec>>,
        create_error: Option<CreateTopicError>,
        metadata_error: Option<String>,
    }

    #[async_trait]
    impl TopicAdmin for FakeAdmin {
        async fn fetch_topic_names(&self, _timeout: Duration) -> Result<Vec<String>, String> {
            match &self.metadata_error {
                Some(e) => Err(e.clone()),
                None => Ok(self.topics.lock().unwrap().clone()),
            }
        }

        async fn create_topic(&self, spec: &TopicSpec) -> Result<(), CreateTopicError> {
            self.creates.lock().unwrap().push(spec.clone());
            if let Some(err) = &self.create_error {
                return Err(err.clone());
            }
            self.topics.lock().unwrap().push(spec.name.clone());
            Ok(())
        }
    }

    fn provisioner() -> TopicProvisioner {
        TopicProvisioner::new(TopicSpec::new("orders-v1", 3, 2), Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_creates_missing_topic_with_configured_params() {
        let admin = FakeAdmin::default();
        let mut p = provisioner();

        let outcome = p.ensure_topic(&admin).await.unwrap();

        assert_eq!(outcome, ProvisionOutcome::Created);
        assert_eq!(p.state(), ProvisionState::Verified);
        assert_eq!(
            *admin.creates.lock().unwrap(),
            vec![TopicSpec::new("orders-v1", 3, 2)]
        );
    }

    #[tokio::test]
    async fn test_existing_topic_is_noop() {
        let admin = FakeAdmin::default();
        admin.topics.lock().unwrap().push("orders-v1".into());
        let mut p = provisioner();

        assert_eq!(
            p.ensure_topic(&admin).await.unwrap(),
            ProvisionOutcome::AlreadyPresent
        );
        assert!(admin.creates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_already_exists_is_success() {
        let admin = FakeAdmin {
            create_error: Some(CreateTopicError::AlreadyExists),
            ..FakeAdmin::default()
        };
        let mut p = provisioner();

        assert_eq!(
            p.ensure_topic(&admin).await.unwrap(),
            ProvisionOutcome::CreatedConcurrently
        );
        assert_eq!(p.state(), ProvisionState::Verified);
    }

    #[tokio::test]
    async fn test_create_failure_is_attempted_once() {
        let admin = FakeAdmin {
            create_error: Some(CreateTopicError::Other("PolicyViolation".into())),
            ..FakeAdmin::default()
        };
        let mut p = provisioner();

        let err = p.ensure_topic(&admin).await.unwrap_err();
        assert!(matches!(err, TopicProvisionError::CreateFailed { .. }));
        assert_eq!(p.state(), ProvisionState::Unverified);

        assert!(p.ensure_topic(&admin).await.is_err());
        assert_eq!(admin.creates.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_metadata_failure_surfaces() {
        let admin = FakeAdmin {
            metadata_error: Some("BrokerTransportFailure".into()),
            ..FakeAdmin::default()
        };
        let mut p = provisioner();

        let err = p.ensure_topic(&admin).await.unwrap_err();
        assert_eq!(
            err,
            TopicProvisionError::Metadata("BrokerTransportFailure".into())
        );
        assert!(admin.creates.lock().unwrap().is_empty());
    }
}
