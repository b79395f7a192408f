//! MSK producer example
//!
//! Publishes a numbered JSON event every second to an MSK topic, authenticating with IAM.
//! The topic is created on first run if it does not exist.
//!
//! Usage:
//!   MSK_ACCESS_KEY_ID=AKIA... \
//!   MSK_SECRET_ACCESS_KEY=... \
//!   MSK_CLUSTER_ARN=arn:aws:kafka:us-east-1:123456789012:cluster/demo/abc \
//!   MSK_REGION=us-east-1 \
//!   MSK_TOPIC=orders-v1 \
//!   cargo run --example msk_producer
//!
//! Set `MSK_BOOTSTRAP_SERVERS` instead of `MSK_CLUSTER_ARN` to skip broker discovery, or
//! pass a TOML file path as the first argument.

use async_trait::async_trait;
use msk_connect_core::{
    ConnectorConfig, ConnectorResult, MessageSource, OutboundMessage, ProducerRuntime,
};
use serde::Serialize;
use std::time::Duration;

#[derive(Serialize)]
struct OrderEvent {
    sequence: u64,
    source: &'static str,
}

/// Emits one event per second
struct OrderEvents {
    sequence: u64,
}

#[async_trait]
impl MessageSource for OrderEvents {
    async fn initialize(&mut self, config: &ConnectorConfig) -> ConnectorResult<()> {
        println!("Publishing to topic {}", config.topic.name);
        Ok(())
    }

    async fn next_message(&mut self) -> ConnectorResult<Option<OutboundMessage>> {
        tokio::time::sleep(Duration::from_secs(1)).await;
        self.sequence += 1;

        let event = OrderEvent {
            sequence: self.sequence,
            source: "msk-producer-demo",
        };
        let message = OutboundMessage::from_json(&event)?
            .with_header("content-type", "application/json");
        Ok(Some(message))
    }

    async fn shutdown(&mut self) -> ConnectorResult<()> {
        println!("Generated {} events", self.sequence);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> ConnectorResult<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => {
            let mut config = ConnectorConfig::from_file(&path)?;
            config.apply_env_overrides();
            config
        }
        None => ConnectorConfig::from_env()?,
    };

    let runtime = ProducerRuntime::new(OrderEvents { sequence: 0 }, config)?;
    let summary = runtime.run().await?;

    println!(
        "Stopped: {} delivered, {} failed, longest failure streak {}",
        summary.delivered, summary.failed, summary.longest_failure_streak
    );
    Ok(())
}
