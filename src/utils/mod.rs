//! Utility modules for connector development.

pub mod health;

pub use health::{HealthChecker, HealthStatus};
