//! Session controller types

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::camera_device::CaptureSettings;
use crate::inference_engine::DEFAULT_MODEL_HOST;
use crate::resource_manager::{BlobStats, SourceKind};
use crate::session_mode::Mode;

/// Controller tuning
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Only model URLs on this host are accepted
    pub model_host: String,
    pub capture: CaptureSettings,
    pub confidence_threshold: f32,
    /// Minimum time between webcam engine calls
    pub prediction_interval: Duration,
    /// Frame clock period driving webcam ticks
    pub frame_interval: Duration,
    pub max_upload_bytes: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model_host: DEFAULT_MODEL_HOST.to_string(),
            capture: CaptureSettings::default(),
            confidence_threshold: 0.0,
            prediction_interval: Duration::from_millis(160),
            frame_interval: Duration::from_millis(16),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Point-in-time view of the session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub mode: Mode,
    /// When the current mode was entered
    pub mode_since: DateTime<Utc>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub model_url: Option<String>,
    pub class_count: usize,
    pub source: SourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub loop_running: bool,
    pub predictions_dispatched: u64,
    pub blobs: BlobStats,
}

/// What one webcam tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was scheduled
    Idle,
    /// Tick found the session no longer streaming
    Cancelled,
    /// Too soon after the last prediction; rescheduled
    Throttled,
    /// An engine call was started
    Dispatched,
    /// Frame capture failed; session moved to Error
    Failed,
}

/// What happened to a finished engine call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    Rendered,
    /// Stale generation, result dropped
    Discarded,
    /// Engine failed; session moved to Error
    Failed,
}
