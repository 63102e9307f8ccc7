//! Camera Device - capture seam for the webcam input source
//!
//! `CameraDevice::open` performs setup (permission + stream negotiation),
//! `Camera::play` waits until frames flow, `capture_frame` returns the most
//! recent frame and `stop` releases the device immediately.

mod ffmpeg;

pub use ffmpeg::{FfmpegCamera, FfmpegCameraDevice};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Requested capture geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    /// Horizontal flip (selfie view)
    pub mirrored: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            mirrored: true,
        }
    }
}

/// Camera failure kinds
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("camera unavailable: {0}")]
    Unavailable(String),

    /// Frames stopped arriving after the camera was playing
    #[error("camera stream ended")]
    StreamEnded,
}

impl CameraError {
    pub fn user_message(&self) -> &'static str {
        match self {
            CameraError::PermissionDenied(_) => {
                "Camera access was denied. Please allow permissions or use image upload mode."
            }
            CameraError::Unavailable(_) => {
                "Unable to start webcam. Please ensure a camera is connected and not in use."
            }
            CameraError::StreamEnded => "Prediction failed. Please restart the webcam.",
        }
    }
}

/// An opened camera
pub trait Camera: Send + 'static {
    /// Start streaming; resolves once the first frame is available
    fn play(&mut self) -> impl Future<Output = Result<(), CameraError>> + Send;

    /// Latest frame
    fn capture_frame(&mut self) -> impl Future<Output = Result<Arc<RgbImage>, CameraError>> + Send;

    /// Stop and release the device. Idempotent.
    fn stop(&mut self);
}

/// Opens cameras
pub trait CameraDevice: Send + Sync + 'static {
    type Camera: Camera;

    fn open(
        &self,
        settings: CaptureSettings,
    ) -> impl Future<Output = Result<Self::Camera, CameraError>> + Send;
}
