//! Wire types returned by the detection backend and the UI state built from them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Drowsiness status tag reported per processed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Awake,
    Drowsy,
    NoFace,
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Status::Awake => "AWAKE",
            Status::Drowsy => "DROWSY",
            Status::NoFace => "NO_FACE",
            Status::Error => "ERROR",
        };
        f.write_str(tag)
    }
}

/// Response of `POST /api/process-frame`.
///
/// Face-less and error responses carry only `frame_count`, so the other
/// counters default to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    #[serde(default)]
    pub ear: Option<f64>,
    pub status: Status,
    #[serde(default)]
    pub alert_triggered: bool,
    #[serde(default)]
    pub closed_eyes_frames: u32,
    #[serde(default)]
    pub frame_count: u64,
    #[serde(default)]
    pub drowsy_frames: u64,
    /// Annotated JPEG, base64 encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Server-side detection thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub ear_threshold: f64,
    pub consecutive_frames: u32,
    pub window_size: u32,
}

/// Cumulative counters from `GET /api/stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    #[serde(default)]
    pub frames_processed: u64,
    #[serde(default)]
    pub drowsy_frames: u64,
    #[serde(default)]
    pub drowsy_percentage: f64,
}

/// Immutable snapshot of everything the renderers show.
///
/// Only the controller produces new snapshots; renderers receive them
/// through a watch channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiState {
    /// Result of the connectivity probe
    pub connected: bool,
    pub running: bool,
    /// Latest successful detection, retained across failed ticks
    pub detection: Option<DetectionResult>,
    /// Decoded annotated JPEG from the latest response that carried one
    pub annotated_frame: Option<Arc<Vec<u8>>>,
    pub config: Option<Configuration>,
    pub stats: SessionStats,
    /// Latest message for the operator (failed start, failed reset, ...)
    pub notice: Option<Notice>,
}

/// Operator-facing message. `id` increases with every new notice so
/// repeated identical texts are still distinguishable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub text: String,
}
