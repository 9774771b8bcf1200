//! Shared types for the detection bridge

use serde::{Deserialize, Deserializer};
use std::fmt;
use std::time::{Duration, Instant};

/// COCO class id reserved for "person" (as emitted by YOLO-style detectors)
pub const PERSON_CLASS_ID: i64 = 0;

/// Detections must score strictly above this to count as a person
pub const PERSON_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Version string used when the deployment marker file is absent
pub const UNKNOWN_VERSION: &str = "unknown";

/// A single classified object from the perception stack.
///
/// Both fields are optional on the wire and accept any JSON number, so a
/// tensor-backed detector sending `0.0` still names the person class. A
/// missing or non-numeric `class_id` never matches the person class; a missing
/// or non-numeric `confidence` reads as 0.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Detection {
    #[serde(default, deserialize_with = "number_or_none")]
    pub class_id: Option<f64>,
    #[serde(default, deserialize_with = "number_or_zero")]
    pub confidence: f64,
}

fn number_or_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(serde_json::Value::deserialize(deserializer)?.as_f64())
}

fn number_or_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(number_or_none(deserializer)?.unwrap_or(0.0))
}

impl Detection {
    pub fn new(class_id: i64, confidence: f64) -> Self {
        Self { class_id: Some(class_id as f64), confidence }
    }

    #[inline]
    pub fn is_person(&self) -> bool {
        self.class_id == Some(PERSON_CLASS_ID as f64)
            && self.confidence > PERSON_CONFIDENCE_THRESHOLD
    }
}

/// All detections carried by one message. Each batch replaces the previous one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionBatch {
    pub detections: Vec<Detection>,
}

impl DetectionBatch {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// True iff any detection is a confident person
    pub fn person_found(&self) -> bool {
        self.detections.iter().any(Detection::is_person)
    }
}

/// Why a detections payload could not be decoded
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid detection at index {index}: {source}")]
    Entry {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Decode a detections payload.
///
/// Well-formed JSON that is not an array carries no detections and decodes to
/// an empty batch. Malformed JSON, invalid UTF-8, or an array entry that is
/// not an object is an error.
pub fn parse_detections(raw: &[u8]) -> Result<DetectionBatch, DetectionError> {
    let value: serde_json::Value = serde_json::from_slice(raw)?;

    let serde_json::Value::Array(entries) = value else {
        return Ok(DetectionBatch::default());
    };

    let mut detections = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let detection = serde_json::from_value::<Detection>(entry)
            .map_err(|source| DetectionError::Entry { index, source })?;
        detections.push(detection);
    }

    Ok(DetectionBatch::new(detections))
}

/// Hand action accepted by the handshake and wave-hand SDK calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandAction {
    Open,
    Close,
}

impl HandAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandAction::Open => "open",
            HandAction::Close => "close",
        }
    }
}

/// The four hand gestures the node issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Handshake,
    CancelHandshake,
    Wave,
    CancelWave,
}

impl GestureKind {
    pub const COUNT: usize = 4;
    pub const ALL: [GestureKind; Self::COUNT] = [
        GestureKind::Handshake,
        GestureKind::CancelHandshake,
        GestureKind::Wave,
        GestureKind::CancelWave,
    ];

    #[inline]
    pub fn index(&self) -> usize {
        match self {
            GestureKind::Handshake => 0,
            GestureKind::CancelHandshake => 1,
            GestureKind::Wave => 2,
            GestureKind::CancelWave => 3,
        }
    }

    /// Hand action sent with this gesture
    pub fn hand_action(&self) -> HandAction {
        match self {
            GestureKind::Handshake | GestureKind::Wave => HandAction::Open,
            GestureKind::CancelHandshake | GestureKind::CancelWave => HandAction::Close,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GestureKind::Handshake => "handshake",
            GestureKind::CancelHandshake => "cancel_handshake",
            GestureKind::Wave => "wave",
            GestureKind::CancelWave => "cancel_wave",
        }
    }
}

impl fmt::Display for GestureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Robot operating modes the node requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotMode {
    Damping,
    Prepare,
    Walking,
}

impl RobotMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RobotMode::Damping => "damping",
            RobotMode::Prepare => "prepare",
            RobotMode::Walking => "walking",
        }
    }
}

/// Presence as rendered in the status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Detected,
    Absent,
}

impl Presence {
    pub fn from_flag(person_detected: bool) -> Self {
        if person_detected {
            Presence::Detected
        } else {
            Presence::Absent
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Presence::Detected => "PERSON DETECTED",
            Presence::Absent => "No person detected",
        }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable state owned by the node.
///
/// The detection handler writes `person_detected` and `last_detection_time`,
/// the gesture controller writes `last_wave_time`, the status reporter reads.
#[derive(Debug, Clone)]
pub struct NodeState {
    pub person_detected: bool,
    pub last_detection_time: Option<Instant>,
    pub last_wave_time: Option<Instant>,
    pub hostname: String,
    pub deployment_version: String,
}

impl NodeState {
    pub fn new(hostname: impl Into<String>, deployment_version: impl Into<String>) -> Self {
        Self {
            person_detected: false,
            last_detection_time: None,
            last_wave_time: None,
            hostname: hostname.into(),
            deployment_version: deployment_version.into(),
        }
    }

    pub fn status_line(&self) -> String {
        format_status(&self.hostname, &self.deployment_version, self.person_detected)
    }

    /// Time left before another wave is allowed, `None` when ready
    pub fn wave_cooldown_remaining(&self, now: Instant, cooldown: Duration) -> Option<Duration> {
        let last = self.last_wave_time?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < cooldown).then(|| cooldown - elapsed)
    }

    /// Time since the last processed detection message, `None` if none yet
    pub fn detection_silence(&self, now: Instant) -> Option<Duration> {
        self.last_detection_time.map(|t| now.saturating_duration_since(t))
    }
}

/// Render the periodic status line
pub fn format_status(hostname: &str, version: &str, person_detected: bool) -> String {
    format!(
        "Robot: {} (v{}) - Status: {}",
        hostname,
        version,
        Presence::from_flag(person_detected)
    )
}
