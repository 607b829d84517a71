//! DrowsyLive - webcam client for a drowsiness detection backend
//!
//! Captures frames from the local camera on a fixed cadence, streams them to
//! the detection service over HTTP, and shows the returned verdicts,
//! annotated frames and session statistics. Drowsy verdicts play an
//! audible alert.

#![forbid(unsafe_code)]

/// Alert tone synthesis and playback
pub mod alert;
/// HTTP client for the detection service
pub mod backend;
/// Camera drivers (native capture with the "camera" feature)
pub mod camera;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
/// Frame acquisition and JPEG encoding
pub mod media;
pub mod reducer;
/// Console and file renderers
pub mod render;
pub mod state;
pub mod util;

#[cfg(test)]
mod fakes;

pub use config::ClientConfig;
pub use controller::Controller;
pub use error::{Error, Result};
