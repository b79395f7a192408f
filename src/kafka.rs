//! Kafka (librdkafka) implementations of the admin and produce surfaces.
//!
//! Both clients speak SASL_SSL/OAUTHBEARER and carry an `AuthClientContext`, so librdkafka
//! asks the auth callback adapter for tokens on its own background thread.

use crate::{
    AuthClientContext, ClusterEndpoint, ConnectorConfig, ConnectorResult,
    CreateTopicError, DeliveryError, DeliveryOutcome, ProduceRecord, RecordProducer, TopicAdmin,
    TopicSpec,
};
use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Base client configuration shared by the admin client and the producer
pub fn client_config(endpoint: &ClusterEndpoint, config: &ConnectorConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", endpoint.bootstrap_servers())
        .set("security.protocol", "SASL_SSL")
        .set("sasl.mechanism", "OAUTHBEARER")
        .set("client.id", &config.connector_name);

    for (key, value) in &config.bootstrap.client_overrides {
        client_config.set(key, value);
    }
    client_config
}

/// `TopicAdmin` over an rdkafka admin client
pub struct KafkaTopicAdmin {
    client: Arc<AdminClient<AuthClientContext>>,
    operation_timeout: Duration,
}

impl KafkaTopicAdmin {
    pub fn create(
        endpoint: &ClusterEndpoint,
        config: &ConnectorConfig,
        context: AuthClientContext,
    ) -> ConnectorResult<Self> {
        let client: AdminClient<AuthClientContext> =
            client_config(endpoint, config).create_with_context(context)?;

        Ok(Self {
            client: Arc::new(client),
            operation_timeout: config.processing.metadata_timeout(),
        })
    }
}

#[async_trait]
impl TopicAdmin for KafkaTopicAdmin {
    async fn fetch_topic_names(&self, timeout: Duration) -> Result<Vec<String>, String> {
        let client = self.client.clone();
        // fetch_metadata blocks the calling thread
        tokio::task::spawn_blocking(move || {
            let metadata = client
                .inner()
                .fetch_metadata(None, timeout)
                .map_err(|e| e.to_string())?;
            Ok(metadata
                .topics()
                .iter()
                .map(|t| t.name().to_string())
                .collect())
        })
        .await
        .map_err(|e| format!("metadata task failed: {}", e))?
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), CreateTopicError> {
        let topic = NewTopic::new(
            &spec.name,
            spec.partition_count,
            TopicReplication::Fixed(spec.replication_factor),
        );
        let opts = AdminOptions::new().operation_timeout(Some(self.operation_timeout));

        let results = self
            .client
            .create_topics(&[topic], &opts)
            .await
            .map_err(|e| CreateTopicError::Other(e.to_string()))?;

        for result in results {
            match result {
                Ok(_) => {}
                Err((_, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    return Err(CreateTopicError::AlreadyExists)
                }
                Err((topic, code)) => {
                    return Err(CreateTopicError::Other(format!("{}: {}", topic, code)))
                }
            }
        }
        Ok(())
    }
}

/// `RecordProducer` over an rdkafka future producer
pub struct KafkaRecordProducer {
    producer: FutureProducer<AuthClientContext>,
    queue_timeout: Duration,
}

impl KafkaRecordProducer {
    pub fn create(
        endpoint: &ClusterEndpoint,
        config: &ConnectorConfig,
        context: AuthClientContext,
    ) -> ConnectorResult<Self> {
        let mut client_config = client_config(endpoint, config);
        if !config
            .bootstrap
            .client_overrides
            .contains_key("message.timeout.ms")
        {
            client_config.set(
                "message.timeout.ms",
                config.processing.produce_timeout_ms.to_string(),
            );
        }

        let producer: FutureProducer<AuthClientContext> =
            client_config.create_with_context(context)?;

        Ok(Self {
            producer,
            queue_timeout: config.processing.produce_timeout(),
        })
    }
}

#[async_trait]
impl RecordProducer for KafkaRecordProducer {
    async fn produce(&self, record: ProduceRecord) -> Result<DeliveryOutcome, DeliveryError> {
        let headers = record
            .headers
            .iter()
            .fold(OwnedHeaders::new_with_capacity(record.headers.len()), |acc, (k, v)| {
                acc.insert(Header {
                    key: k.as_str(),
                    value: Some(v.as_str()),
                })
            });

        let future_record = FutureRecord::to(&record.topic)
            .key(&record.key)
            .payload(&record.value)
            .headers(headers);

        match self.producer.send(future_record, self.queue_timeout).await {
            Ok((partition, offset)) => Ok(DeliveryOutcome {
                topic: record.topic,
                partition,
                offset,
            }),
            Err((err, _message)) => Err(delivery_error(&err)),
        }
    }

    async fn flush(&self, timeout: Duration) -> Result<(), DeliveryError> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| DeliveryError::new("FlushTask", e.to_string()))?
            .map_err(|e| delivery_error(&e))?;
        debug!("producer flushed");
        Ok(())
    }
}

fn delivery_error(err: &KafkaError) -> DeliveryError {
    let code = err
        .rdkafka_error_code()
        .map(|code| format!("{:?}", code))
        .unwrap_or_else(|| "Unknown".to_string());
    DeliveryError::new(code, err.to_string())
}
