//! In-process stand-ins for the backend, the camera and the audio output.

use crate::alert::{Tone, TonePlayer};
use crate::backend::{Backend, TransportResult};
use crate::config::Resolution;
use crate::error::{Error, Result};
use crate::media::{CameraDriver, FrameGrabber, FrameSource, Snapshot};
use crate::state::{Configuration, DetectionResult, SessionStats, Status};
use futures_util::future::{self, BoxFuture, FutureExt};
use image::{Rgb, RgbImage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

pub fn awake(ear: f64) -> DetectionResult {
    DetectionResult {
        ear: Some(ear),
        status: Status::Awake,
        alert_triggered: false,
        closed_eyes_frames: 0,
        frame_count: 1,
        drowsy_frames: 0,
        frame_base64: None,
        message: None,
    }
}

pub fn drowsy() -> DetectionResult {
    DetectionResult {
        ear: Some(0.18),
        status: Status::Drowsy,
        alert_triggered: true,
        closed_eyes_frames: 20,
        drowsy_frames: 1,
        ..awake(0.18)
    }
}

type Script<T> = Mutex<VecDeque<(Duration, TransportResult<T>)>>;

/// Scripted backend. Each frame or stats call pops the next scripted
/// response and delivers it after its delay; once a script runs out the
/// call never completes.
pub struct FakeBackend {
    frames: Script<DetectionResult>,
    stats: Script<SessionStats>,
    frame_calls: AtomicUsize,
    stats_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
            stats: Mutex::new(VecDeque::new()),
            frame_calls: AtomicUsize::new(0),
            stats_calls: AtomicUsize::new(0),
        }
    }

    pub fn push_frame(&self, delay: Duration, result: TransportResult<DetectionResult>) {
        self.frames.lock().unwrap().push_back((delay, result));
    }

    pub fn push_stats(&self, delay: Duration, result: TransportResult<SessionStats>) {
        self.stats.lock().unwrap().push_back((delay, result));
    }

    pub fn frame_calls(&self) -> usize {
        self.frame_calls.load(Ordering::SeqCst)
    }

    pub fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    fn config_value(ear_threshold: f64) -> Configuration {
        Configuration {
            ear_threshold,
            consecutive_frames: 20,
            window_size: 10,
        }
    }
}

fn play_script<T: Send + 'static>(script: &Script<T>) -> BoxFuture<'static, TransportResult<T>> {
    match script.lock().unwrap().pop_front() {
        Some((delay, result)) => async move {
            tokio::time::sleep(delay).await;
            result
        }
        .boxed(),
        None => future::pending::<TransportResult<T>>().boxed(),
    }
}

impl Backend for FakeBackend {
    fn process_frame(&self, _snapshot: Snapshot) -> BoxFuture<'static, TransportResult<DetectionResult>> {
        self.frame_calls.fetch_add(1, Ordering::SeqCst);
        play_script(&self.frames)
    }

    fn health(&self) -> BoxFuture<'static, TransportResult<serde_json::Value>> {
        future::ready(Ok(serde_json::json!({"status": "healthy"}))).boxed()
    }

    fn config(&self) -> BoxFuture<'static, TransportResult<Configuration>> {
        future::ready(Ok(Self::config_value(0.25))).boxed()
    }

    fn update_config(&self, patch: serde_json::Value) -> BoxFuture<'static, TransportResult<Configuration>> {
        let threshold = patch["ear_threshold"].as_f64().unwrap_or(0.25);
        future::ready(Ok(Self::config_value(threshold))).boxed()
    }

    fn stats(&self) -> BoxFuture<'static, TransportResult<SessionStats>> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        play_script(&self.stats)
    }

    fn reset(&self) -> BoxFuture<'static, TransportResult<()>> {
        future::ready(Ok(())).boxed()
    }
}

#[derive(Default)]
struct FramesShared {
    acquires: AtomicUsize,
    releases: AtomicUsize,
    snapshots: AtomicUsize,
    acquired: AtomicBool,
    not_ready: AtomicBool,
}

/// Frame source that hands out a tiny fixed JPEG.
pub struct FakeFrames {
    shared: Arc<FramesShared>,
    fail_acquire: Option<String>,
}

/// Observer side of a [`FakeFrames`].
pub struct FramesProbe {
    shared: Arc<FramesShared>,
}

impl FakeFrames {
    pub fn new() -> (Self, FramesProbe) {
        let shared = Arc::new(FramesShared::default());
        let probe = FramesProbe {
            shared: shared.clone(),
        };
        (
            Self {
                shared,
                fail_acquire: None,
            },
            probe,
        )
    }

    pub fn failing(reason: &str) -> (Self, FramesProbe) {
        let (mut frames, probe) = Self::new();
        frames.fail_acquire = Some(reason.to_string());
        (frames, probe)
    }
}

impl FrameSource for FakeFrames {
    fn acquire(&mut self) -> Result<()> {
        if let Some(reason) = &self.fail_acquire {
            return Err(Error::DeviceUnavailable(reason.clone()));
        }
        if !self.shared.acquired.swap(true, Ordering::SeqCst) {
            self.shared.acquires.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn release(&mut self) {
        if self.shared.acquired.swap(false, Ordering::SeqCst) {
            self.shared.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn snapshot(&mut self) -> Option<Snapshot> {
        self.shared.snapshots.fetch_add(1, Ordering::SeqCst);
        if !self.shared.acquired.load(Ordering::SeqCst) || self.shared.not_ready.load(Ordering::SeqCst) {
            return None;
        }
        Some(Snapshot {
            jpeg: vec![0xFF, 0xD8, 0xFF, 0xD9],
            width: 640,
            height: 480,
        })
    }
}

impl FramesProbe {
    pub fn acquires(&self) -> usize {
        self.shared.acquires.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.shared.releases.load(Ordering::SeqCst)
    }

    pub fn snapshots(&self) -> usize {
        self.shared.snapshots.load(Ordering::SeqCst)
    }

    pub fn acquired(&self) -> bool {
        self.shared.acquired.load(Ordering::SeqCst)
    }

    pub fn set_ready(&self, ready: bool) {
        self.shared.not_ready.store(!ready, Ordering::SeqCst);
    }
}

/// Camera producing solid frames every couple of milliseconds.
pub struct FakeCamera {
    size: Resolution,
    fail_open: Option<String>,
    /// Refuse a second open while a grabber is alive, like a V4L2 node
    exclusive: bool,
    open_delay: Duration,
    grab_delay: Duration,
    opens: AtomicUsize,
    streams: Arc<AtomicUsize>,
}

impl FakeCamera {
    pub fn new(size: Resolution) -> Self {
        Self {
            size,
            fail_open: None,
            exclusive: false,
            open_delay: Duration::ZERO,
            grab_delay: Duration::from_millis(2),
            opens: AtomicUsize::new(0),
            streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            fail_open: Some(reason.to_string()),
            ..Self::new(Resolution::new(640, 480))
        }
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn with_grab_delay(mut self, delay: Duration) -> Self {
        self.grab_delay = delay;
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Grabbers not yet dropped
    pub fn open_streams(&self) -> usize {
        self.streams.load(Ordering::SeqCst)
    }
}

impl CameraDriver for FakeCamera {
    fn open(&self, _preferred: Resolution) -> std::result::Result<Box<dyn FrameGrabber>, String> {
        std::thread::sleep(self.open_delay);
        if let Some(reason) = &self.fail_open {
            return Err(reason.clone());
        }
        if self.exclusive {
            self.streams
                .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                .map_err(|_| "device busy".to_string())?;
        } else {
            self.streams.fetch_add(1, Ordering::SeqCst);
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeGrabber {
            size: self.size,
            delay: self.grab_delay,
            streams: self.streams.clone(),
        }))
    }
}

struct FakeGrabber {
    size: Resolution,
    delay: Duration,
    streams: Arc<AtomicUsize>,
}

impl FrameGrabber for FakeGrabber {
    fn grab(&mut self) -> std::result::Result<RgbImage, String> {
        std::thread::sleep(self.delay);
        Ok(RgbImage::from_pixel(self.size.width, self.size.height, Rgb([90, 120, 150])))
    }
}

impl Drop for FakeGrabber {
    fn drop(&mut self) {
        self.streams.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Player whose `play` blocks until the test opens the gate (or 5 s pass).
pub struct GatedPlayer {
    gate: Mutex<mpsc::Receiver<()>>,
    plays: AtomicUsize,
}

impl GatedPlayer {
    pub fn new() -> (Arc<Self>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let player = Arc::new(Self {
            gate: Mutex::new(rx),
            plays: AtomicUsize::new(0),
        });
        (player, tx)
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }
}

impl TonePlayer for GatedPlayer {
    fn play(&self, _tone: &Tone) -> Result<()> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        let _ = self.gate.lock().unwrap().recv_timeout(Duration::from_secs(5));
        Ok(())
    }
}
