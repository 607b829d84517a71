//! Pure state transitions applied by the controller.
//!
//! Each function takes the previous snapshot by reference and returns the
//! next one; nothing here performs I/O or touches the notifier.

use crate::state::{Configuration, DetectionResult, SessionStats, UiState};
use base64::engine::general_purpose;
use base64::Engine;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub state: UiState,
    /// The caller should start an alert tone.
    pub fire_alert: bool,
}

/// A tone is due only when the backend flags the frame and no tone is playing.
pub fn should_alert(alert_triggered: bool, alert_sounding: bool) -> bool {
    alert_triggered && !alert_sounding
}

/// Apply one successful detection response.
///
/// The detection facet is replaced wholesale. The annotated frame is
/// replaced only when the response carries one that decodes; the base64
/// payload itself is not kept in the detection facet.
pub fn reduce_detection(prev: &UiState, alert_sounding: bool, mut result: DetectionResult) -> Reduction {
    let mut state = prev.clone();

    if let Some(encoded) = result.frame_base64.take() {
        match general_purpose::STANDARD.decode(encoded.as_bytes()) {
            Ok(jpeg) => state.annotated_frame = Some(Arc::new(jpeg)),
            Err(e) => warn!("Keeping previous annotated frame, payload did not decode: {}", e),
        }
    }

    let fire_alert = should_alert(result.alert_triggered, alert_sounding);
    state.detection = Some(result);

    Reduction { state, fire_alert }
}

pub fn reduce_stats(prev: &UiState, stats: SessionStats) -> UiState {
    UiState {
        stats,
        ..prev.clone()
    }
}

pub fn reduce_config(prev: &UiState, config: Configuration) -> UiState {
    UiState {
        config: Some(config),
        ..prev.clone()
    }
}

/// Local effect of a successful `POST /api/reset`.
pub fn reduce_reset(prev: &UiState) -> UiState {
    UiState {
        detection: None,
        annotated_frame: None,
        stats: SessionStats::default(),
        ..prev.clone()
    }
}
