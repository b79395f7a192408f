//! Runtime for managing connector lifecycle.
//!
//! - `ProducerRuntime`: startup sequence and wiring (caller content → MSK)
//! - `PublishLoop`: the cancellable publish loop it drives
//!
//! The runtime handles:
//! - Session credential acquisition and broker discovery
//! - OAUTHBEARER token refresh wiring for the Kafka clients
//! - Topic provisioning
//! - Failure policy, health tracking and graceful shutdown

mod producer_runtime;
mod publish_loop;

pub use producer_runtime::ProducerRuntime;
pub use publish_loop::{PublishAttempt, PublishLoop, PublishSummary, StopReason};
