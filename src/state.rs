//! Application state
//!
//! Holds configuration and the shared components handed to HTTP handlers

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::camera_device::CaptureSettings;
use crate::error::{Error, Result};
use crate::inference_engine::{ModelSource, DEFAULT_MODEL_HOST};
use crate::realtime_hub::RealtimeHub;
use crate::resource_manager::BlobStore;
use crate::session_controller::{SessionConfig, SessionHandle};

pub const DEFAULT_MODEL_URL: &str = "https://teachablemachine.withgoogle.com/models/YFgzqdy36/";

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Model loaded at startup
    pub model_url: String,
    /// Host accepted in model URLs
    pub model_host: String,
    /// Classification backend URL
    pub inference_url: String,
    pub inference_timeout: Duration,
    /// V4L2 device, RTSP URL or file handed to ffmpeg
    pub camera_uri: String,
    pub ffmpeg_bin: String,
    /// How long the camera may take to deliver its first frame
    pub camera_startup_timeout: Duration,
    pub webcam_width: u32,
    pub webcam_height: u32,
    pub flip_horizontal: bool,
    pub confidence_threshold: f32,
    pub prediction_interval: Duration,
    pub frame_interval: Duration,
    pub max_upload_bytes: u64,
    /// Optional frontend served at `/`
    pub static_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 8080),
            model_url: std::env::var("MODEL_URL")
                .unwrap_or_else(|_| DEFAULT_MODEL_URL.to_string()),
            model_host: std::env::var("MODEL_HOST")
                .unwrap_or_else(|_| DEFAULT_MODEL_HOST.to_string()),
            inference_url: std::env::var("INFERENCE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9000".to_string()),
            inference_timeout: Duration::from_millis(env_or("INFERENCE_TIMEOUT_MS", 10_000)),
            camera_uri: std::env::var("CAMERA_URI").unwrap_or_else(|_| "/dev/video0".to_string()),
            ffmpeg_bin: std::env::var("FFMPEG_BIN").unwrap_or_else(|_| "ffmpeg".to_string()),
            camera_startup_timeout: Duration::from_millis(env_or(
                "CAMERA_STARTUP_TIMEOUT_MS",
                10_000,
            )),
            webcam_width: env_or("WEBCAM_WIDTH", 640),
            webcam_height: env_or("WEBCAM_HEIGHT", 480),
            flip_horizontal: env_or("FLIP_HORIZONTAL", true),
            confidence_threshold: env_or("CONFIDENCE_THRESHOLD", 0.0),
            prediction_interval: Duration::from_millis(env_or("PREDICTION_INTERVAL_MS", 160)),
            frame_interval: Duration::from_millis(env_or("FRAME_INTERVAL_MS", 16)),
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", 10 * 1024 * 1024),
            static_dir: std::env::var("STATIC_DIR").ok().map(PathBuf::from),
        }
    }
}

impl AppConfig {
    /// Reject values the session cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.webcam_width == 0 || self.webcam_height == 0 {
            return Err(Error::Config(format!(
                "webcam size must be non-zero, got {}x{}",
                self.webcam_width, self.webcam_height
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::Config(format!(
                "CONFIDENCE_THRESHOLD must be within 0..=1, got {}",
                self.confidence_threshold
            )));
        }
        if self.camera_startup_timeout.is_zero() {
            return Err(Error::Config(
                "CAMERA_STARTUP_TIMEOUT_MS must be positive".to_string(),
            ));
        }
        if self.frame_interval.is_zero() {
            return Err(Error::Config("FRAME_INTERVAL_MS must be positive".to_string()));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::Config("MAX_UPLOAD_BYTES must be positive".to_string()));
        }
        ModelSource::parse(&self.model_url, &self.model_host)
            .map_err(|e| Error::Config(format!("MODEL_URL: {}", e)))?;
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            model_host: self.model_host.clone(),
            capture: CaptureSettings {
                width: self.webcam_width,
                height: self.webcam_height,
                mirrored: self.flip_horizontal,
            },
            confidence_threshold: self.confidence_threshold,
            prediction_interval: self.prediction_interval,
            frame_interval: self.frame_interval,
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub session: SessionHandle,
    pub realtime: Arc<RealtimeHub>,
    pub blobs: Arc<BlobStore>,
    pub started_at: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = AppConfig {
            model_url: DEFAULT_MODEL_URL.to_string(),
            model_host: DEFAULT_MODEL_HOST.to_string(),
            webcam_width: 640,
            webcam_height: 480,
            confidence_threshold: 0.0,
            frame_interval: Duration::from_millis(16),
            max_upload_bytes: 10 * 1024 * 1024,
            ..AppConfig::default()
        };
        assert!(config.validate().is_ok());

        let session = config.session_config();
        assert_eq!(session.capture.width, 640);
        assert_eq!(session.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let config = AppConfig {
            model_url: DEFAULT_MODEL_URL.to_string(),
            model_host: DEFAULT_MODEL_HOST.to_string(),
            confidence_threshold: 1.5,
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_zero_camera_startup_timeout() {
        let config = AppConfig {
            model_url: DEFAULT_MODEL_URL.to_string(),
            model_host: DEFAULT_MODEL_HOST.to_string(),
            confidence_threshold: 0.0,
            camera_startup_timeout: Duration::ZERO,
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_foreign_model_url() {
        let config = AppConfig {
            model_url: "https://evil.com/models/abc/".to_string(),
            model_host: DEFAULT_MODEL_HOST.to_string(),
            confidence_threshold: 0.0,
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
