//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `mqtt` - MQTT client for receiving detection batches
//! - `mqtt_egress` - MQTT publisher for status lines
//! - `egress_channel` - Typed channel for MQTT egress messages
//! - `sdk_bridge` - HTTP client for the robot motion SDK bridge
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod egress_channel;
pub mod mqtt;
pub mod mqtt_egress;
pub mod prometheus;
pub mod sdk_bridge;

// Re-export commonly used types
pub use egress_channel::{create_egress_channel, EgressMessage, EgressSender};
pub use mqtt_egress::MqttPublisher;
pub use sdk_bridge::HttpLocoClient;
