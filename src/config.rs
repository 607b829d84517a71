//! Client configuration, resolved once at process start from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Camera and snapshot encoding parameters.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub camera_index: u32,
    /// Resolution requested from the device; the driver may pick the closest match.
    pub preferred: Resolution,
    /// Every snapshot is scaled to exactly this size before encoding.
    pub target: Resolution,
    pub jpeg_quality: u8,
    /// How long `acquire` waits for the driver to open the device
    pub open_timeout: Duration,
    /// How long `release` waits for the capture thread to drop the device
    pub release_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            preferred: Resolution::new(640, 480),
            target: Resolution::new(640, 480),
            jpeg_quality: 80,
            open_timeout: Duration::from_secs(5),
            release_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base address of the detection backend, without a trailing slash
    pub base_url: String,
    /// Cadence period (10 captures/second by default)
    pub frame_interval: Duration,
    /// Statistics poll period while a session runs
    pub stats_interval: Duration,
    pub capture: CaptureConfig,
    /// Where the console binary mirrors the annotated frame, if anywhere
    pub annotated_frame_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            frame_interval: Duration::from_millis(100),
            stats_interval: Duration::from_millis(2000),
            capture: CaptureConfig::default(),
            annotated_frame_path: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Bad values are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("DROWSY_API_URL") {
            let url = url.trim().trim_end_matches('/');
            if url.is_empty() {
                warn!("DROWSY_API_URL is empty, using {}", DEFAULT_API_URL);
            } else {
                config.base_url = url.to_string();
            }
        }
        if let Some(index) = parse_var(&lookup, "DROWSY_CAMERA_INDEX") {
            config.capture.camera_index = index;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "DROWSY_FRAME_INTERVAL_MS").filter(|ms| *ms > 0) {
            config.frame_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "DROWSY_STATS_INTERVAL_MS").filter(|ms| *ms > 0) {
            config.stats_interval = Duration::from_millis(ms);
        }
        match parse_var::<u8, _>(&lookup, "DROWSY_JPEG_QUALITY") {
            Some(q) if (1..=100).contains(&q) => config.capture.jpeg_quality = q,
            Some(q) => warn!("DROWSY_JPEG_QUALITY={} out of range 1..=100, ignoring", q),
            None => {}
        }
        if let Some(path) = lookup("DROWSY_ANNOTATED_FRAME").filter(|p| !p.trim().is_empty()) {
            config.annotated_frame_path = Some(PathBuf::from(path));
        }

        config
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring unparseable {}={:?}", key, raw);
            None
        }
    }
}
