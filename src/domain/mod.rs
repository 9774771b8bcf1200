//! Domain models - detection payloads and robot command vocabulary
//!
//! This module contains the canonical data types used throughout the node:
//! - `Detection` / `DetectionBatch` - perception output and the person predicate
//! - `HandAction` / `RobotMode` - SDK command vocabulary
//! - `NodeState` - presence flag, timestamps and robot identity
//! - `format_status` - the periodic status line

pub mod types;

pub use types::{
    format_status, parse_detections, Detection, DetectionBatch, DetectionError, GestureKind,
    HandAction, NodeState, Presence, RobotMode,
};
