//! Camera drivers (enabled with the "camera" feature)

#[cfg(feature = "camera")]
use nokhwa::pixel_format::RgbFormat;
#[cfg(feature = "camera")]
use nokhwa::utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType};
#[cfg(feature = "camera")]
use nokhwa::Camera;
#[cfg(feature = "camera")]
use tracing::{info, warn};

#[cfg(feature = "camera")]
use image::RgbImage;

use crate::config::Resolution;
use crate::media::{CameraDriver, FrameGrabber};
use std::sync::Arc;

/// Webcam driver backed by `nokhwa`.
#[cfg(feature = "camera")]
pub struct NativeCamera {
    index: u32,
}

#[cfg(feature = "camera")]
impl NativeCamera {
    pub fn new(index: u32) -> Self {
        Self { index }
    }
}

#[cfg(feature = "camera")]
impl CameraDriver for NativeCamera {
    fn open(&self, preferred: Resolution) -> Result<Box<dyn FrameGrabber>, String> {
        let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            nokhwa::utils::Resolution::new(preferred.width, preferred.height),
            FrameFormat::MJPEG,
            30,
        )));

        let mut camera = Camera::new(CameraIndex::Index(self.index), format)
            .map_err(|e| format!("cannot open camera {}: {}", self.index, e))?;
        camera
            .open_stream()
            .map_err(|e| format!("cannot start camera stream: {}", e))?;

        let actual = camera.resolution();
        info!(
            "Camera {} streaming at {}x{}",
            self.index,
            actual.width(),
            actual.height()
        );

        Ok(Box::new(NativeGrabber { camera }))
    }
}

#[cfg(feature = "camera")]
struct NativeGrabber {
    camera: Camera,
}

#[cfg(feature = "camera")]
impl FrameGrabber for NativeGrabber {
    fn grab(&mut self) -> Result<RgbImage, String> {
        let frame = self.camera.frame().map_err(|e| e.to_string())?;
        let decoded = frame.decode_image::<RgbFormat>().map_err(|e| e.to_string())?;
        let (width, height) = decoded.dimensions();
        RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| "decoded frame has an unexpected buffer size".to_string())
    }
}

#[cfg(feature = "camera")]
impl Drop for NativeGrabber {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            warn!("Failed to stop camera stream: {}", e);
        }
    }
}

/// Driver used when the crate is built without the `camera` feature.
#[cfg(not(feature = "camera"))]
pub struct NativeCamera;

#[cfg(not(feature = "camera"))]
impl NativeCamera {
    pub fn new(_index: u32) -> Self {
        Self
    }
}

#[cfg(not(feature = "camera"))]
impl CameraDriver for NativeCamera {
    fn open(&self, _preferred: Resolution) -> Result<Box<dyn FrameGrabber>, String> {
        Err("camera support not compiled in (enable the `camera` feature)".to_string())
    }
}

pub fn default_driver(index: u32) -> Arc<dyn CameraDriver> {
    Arc::new(NativeCamera::new(index))
}
