//! Media source: exclusive owner of the camera stream
//!
//! The device is opened and read on a dedicated OS thread (camera APIs
//! block and their handles are generally not `Send`). The thread keeps
//! only the most recent frame; `snapshot()` scales and encodes that frame
//! on demand, so frames nobody asks for are simply overwritten.
//!
//! Both ends of the device lifetime are bounded: `acquire()` gives up if
//! the driver does not open within `open_timeout`, and `release()` returns
//! once the capture thread has dropped the device handle, or after
//! `release_timeout` if a grab is stuck.

use crate::config::{CaptureConfig, Resolution};
use crate::error::{Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const GRAB_RETRY_DELAY: Duration = Duration::from_millis(20);

/// One still image, JPEG encoded at the target resolution.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Snapshot {
    pub fn mime_type(&self) -> &'static str {
        "image/jpeg"
    }
}

/// Something that can be started, stopped and asked for the current frame.
pub trait FrameSource: Send {
    /// Take exclusive access to the device. Calling it while acquired is a no-op.
    fn acquire(&mut self) -> Result<()>;
    /// Stop the stream and drop the device handle. Safe to call at any time.
    fn release(&mut self);
    /// Encoded current frame, or `None` if there is nothing to send this tick.
    fn snapshot(&mut self) -> Option<Snapshot>;
}

/// An open camera stream. Lives on the capture thread only.
pub trait FrameGrabber {
    /// Block until the next frame is available.
    fn grab(&mut self) -> std::result::Result<RgbImage, String>;
}

/// Opens camera streams. The returned grabber stays on the thread that opened it.
pub trait CameraDriver: Send + Sync {
    fn open(&self, preferred: Resolution) -> std::result::Result<Box<dyn FrameGrabber>, String>;
}

type LatestFrame = Option<Arc<RgbImage>>;

struct ActiveStream {
    shutdown: Arc<AtomicBool>,
    latest: watch::Receiver<LatestFrame>,
    /// Disconnects once the capture thread has dropped its grabber
    stopped: mpsc::Receiver<()>,
    thread: JoinHandle<()>,
}

/// Camera-backed [`FrameSource`].
pub struct MediaSource {
    driver: Arc<dyn CameraDriver>,
    config: CaptureConfig,
    active: Option<ActiveStream>,
}

impl MediaSource {
    pub fn new(driver: Arc<dyn CameraDriver>, config: CaptureConfig) -> Self {
        Self {
            driver,
            config,
            active: None,
        }
    }

    pub fn is_acquired(&self) -> bool {
        self.active.is_some()
    }
}

impl FrameSource for MediaSource {
    fn acquire(&mut self) -> Result<()> {
        if self.active.is_some() {
            debug!("Camera already acquired");
            return Ok(());
        }

        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (stopped_tx, stopped_rx) = mpsc::channel();
        let (frame_tx, frame_rx) = watch::channel(None);
        let shutdown = Arc::new(AtomicBool::new(false));

        let driver = self.driver.clone();
        let preferred = self.config.preferred;
        let shutdown_clone = shutdown.clone();

        let thread = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || {
                // Dropped last, after the grabber
                let _stopped = stopped_tx;
                run_capture(driver, preferred, ready_tx, frame_tx, shutdown_clone)
            })
            .map_err(|e| Error::DeviceUnavailable(format!("failed to spawn capture thread: {}", e)))?;

        match ready_rx.recv_timeout(self.config.open_timeout) {
            Ok(Ok(())) => {
                info!(
                    "Camera {} acquired ({}x{} requested)",
                    self.config.camera_index, preferred.width, preferred.height
                );
                self.active = Some(ActiveStream {
                    shutdown,
                    latest: frame_rx,
                    stopped: stopped_rx,
                    thread,
                });
                Ok(())
            }
            Ok(Err(reason)) => Err(Error::DeviceUnavailable(reason)),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // The thread drops the device as soon as the driver returns
                shutdown.store(true, Ordering::Relaxed);
                Err(Error::DeviceUnavailable(format!(
                    "camera did not open within {} ms",
                    self.config.open_timeout.as_millis()
                )))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Error::DeviceUnavailable(
                "capture thread exited while opening the camera".to_string(),
            )),
        }
    }

    fn release(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.shutdown.store(true, Ordering::Relaxed);

        match active.stopped.recv_timeout(self.config.release_timeout) {
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    "Camera grab still blocked after {} ms, leaving the capture thread to finish on its own",
                    self.config.release_timeout.as_millis()
                );
            }
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                if active.thread.join().is_err() {
                    warn!("Capture thread panicked");
                }
                info!("Camera released");
            }
        }
    }

    fn snapshot(&mut self) -> Option<Snapshot> {
        let frame = self.active.as_ref()?.latest.borrow().clone()?;

        match encode_snapshot(&frame, self.config.target, self.config.jpeg_quality) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Dropping frame, encode failed: {}", e);
                None
            }
        }
    }
}

impl Drop for MediaSource {
    fn drop(&mut self) {
        self.release();
    }
}

fn run_capture(
    driver: Arc<dyn CameraDriver>,
    preferred: Resolution,
    ready: mpsc::SyncSender<std::result::Result<(), String>>,
    frames: watch::Sender<LatestFrame>,
    shutdown: Arc<AtomicBool>,
) {
    let mut grabber = match driver.open(preferred) {
        Ok(grabber) => {
            if ready.send(Ok(())).is_err() || shutdown.load(Ordering::Relaxed) {
                debug!("Camera opened after acquire gave up, closing it");
                return;
            }
            grabber
        }
        Err(reason) => {
            let _ = ready.send(Err(reason));
            return;
        }
    };

    let mut consecutive_failures = 0u32;
    while !shutdown.load(Ordering::Relaxed) {
        match grabber.grab() {
            Ok(frame) => {
                consecutive_failures = 0;
                frames.send_replace(Some(Arc::new(frame)));
            }
            Err(e) => {
                consecutive_failures += 1;
                if consecutive_failures == 1 {
                    warn!("Camera frame grab failed: {}", e);
                } else {
                    debug!("Camera frame grab failed ({} in a row): {}", consecutive_failures, e);
                }
                std::thread::sleep(GRAB_RETRY_DELAY);
            }
        }
    }

    drop(grabber);
    debug!("Capture thread stopped");
}

/// Scale `frame` to `target` and encode it as JPEG.
pub fn encode_snapshot(frame: &RgbImage, target: Resolution, quality: u8) -> Result<Snapshot> {
    let scaled;
    let image = if frame.dimensions() == (target.width, target.height) {
        frame
    } else {
        scaled = imageops::resize(frame, target.width, target.height, FilterType::Triangle);
        &scaled
    };

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality).encode_image(image)?;

    Ok(Snapshot {
        jpeg,
        width: target.width,
        height: target.height,
    })
}
