//! Console renderers
//!
//! Renderers only read [`UiState`] snapshots from the watch channel. They
//! never talk to the controller, so a slow terminal or disk cannot delay
//! the cadence.

use crate::state::{Status, UiState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// One-line summary of the current state.
pub fn status_line(state: &UiState) -> String {
    let link = if state.connected { "connected" } else { "disconnected" };
    let run = if state.running { "running" } else { "stopped" };

    let detection = match &state.detection {
        None => "no detection yet".to_string(),
        Some(d) => {
            let ear = d.ear.map_or_else(|| "--".to_string(), |ear| format!("{:.3}", ear));
            let mut line = format!("{} EAR {} closed {}", d.status, ear, d.closed_eyes_frames);
            if let Some(message) = &d.message {
                line.push_str(&format!(" ({})", message));
            }
            line
        }
    };

    format!(
        "[{} | {}] {} | frames {} drowsy {} ({:.1}%)",
        link,
        run,
        detection,
        state.stats.frames_processed,
        state.stats.drowsy_frames,
        state.stats.drowsy_percentage
    )
}

fn banner(state: &UiState) -> Option<&'static str> {
    match state.detection.as_ref()?.status {
        Status::Drowsy => Some("⚠️  DROWSINESS DETECTED"),
        Status::Error => Some("Backend could not process the frame"),
        Status::Awake | Status::NoFace => None,
    }
}

/// Print the status line whenever it changes, and every new notice once.
pub async fn run_console(mut states: watch::Receiver<Arc<UiState>>) {
    let mut last_line = String::new();
    let mut last_notice = 0u64;

    loop {
        let state = states.borrow_and_update().clone();

        if let Some(notice) = &state.notice {
            if notice.id > last_notice {
                last_notice = notice.id;
                println!(">>> {}", notice.text);
            }
        }

        let line = status_line(&state);
        if line != last_line {
            if let Some(banner) = banner(&state) {
                println!("{}", banner);
            }
            println!("{}", line);
            last_line = line;
        }

        if states.changed().await.is_err() {
            debug!("State channel closed, console renderer exiting");
            break;
        }
    }
}

/// Write each new annotated frame to `path`, replacing the previous one.
pub async fn run_frame_writer(mut states: watch::Receiver<Arc<UiState>>, path: PathBuf) {
    let mut last: Option<Arc<Vec<u8>>> = None;

    while states.changed().await.is_ok() {
        let frame = states.borrow_and_update().annotated_frame.clone();
        let Some(frame) = frame else {
            last = None;
            continue;
        };
        if last.as_ref().is_some_and(|prev| Arc::ptr_eq(prev, &frame)) {
            continue;
        }

        if let Err(e) = tokio::fs::write(&path, frame.as_slice()).await {
            warn!("Could not write annotated frame to {}: {}", path.display(), e);
        }
        last = Some(frame);
    }
    debug!("State channel closed, frame writer exiting");
}
