//! API request/response models

use serde::{Deserialize, Serialize};

/// Response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub session_running: bool,
    pub ws_clients: u64,
}

/// POST /api/model
#[derive(Debug, Clone, Deserialize)]
pub struct LoadModelRequest {
    pub url: String,
}

/// POST /api/visibility
#[derive(Debug, Clone, Deserialize)]
pub struct VisibilityRequest {
    pub hidden: bool,
}

/// POST /api/webcam/stop
#[derive(Debug, Clone, Serialize)]
pub struct StopWebcamResponse {
    pub released: bool,
}
