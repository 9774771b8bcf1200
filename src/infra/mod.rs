//! Infrastructure - configuration, identity, metrics, and broker
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults)
//! - `identity` - Hostname and deployment version lookup
//! - `metrics` - Lock-free metrics collection
//! - `broker` - Embedded MQTT broker (rumqttd)

pub mod broker;
pub mod config;
pub mod identity;
pub mod metrics;

// Re-export commonly used types
pub use config::{Config, LogFormat, RobotBackend};
pub use metrics::Metrics;
