//! Services - robot behaviour and state management
//!
//! This module contains the core services:
//! - `node` - Detection listener, gesture policy and status reporter
//! - `gesture` - Handshake and wave commands with settle delay
//! - `loco` - Motion SDK client interface and simulator

pub mod gesture;
pub mod loco;
pub mod node;

// Re-export commonly used types
pub use gesture::GestureController;
pub use loco::{LocoClient, SimLocoClient};
pub use node::HelloNode;
