//! Error handling for the classifier session server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::camera_device::CameraError;
use crate::inference_engine::{InferenceError, ModelLoadError};
use crate::session_mode::Mode;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

const MIB: u64 = 1024 * 1024;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Model URL does not match the hosted-model shape
    #[error("Invalid model URL: {0}")]
    InvalidModelUrl(String),

    /// Model fetch or validation failed
    #[error("Model load failed: {0}")]
    ModelLoad(#[from] ModelLoadError),

    /// Operation needs a loaded model
    #[error("Model is not loaded")]
    ModelNotReady,

    /// Camera could not be acquired or stopped producing frames
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    /// Submitted file is not an image
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// Submitted file exceeds the upload ceiling
    #[error("File too large: {size} bytes (limit {limit} bytes)")]
    FileTooLarge { size: u64, limit: u64 },

    /// Submitted image could not be decoded
    #[error("Image decode failed: {0}")]
    ImageDecode(String),

    /// Inference engine call failed
    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),

    /// Mode change rejected by the state machine
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: Mode, to: Mode },

    /// Session controller task is gone
    #[error("Session controller is not running")]
    SessionClosed,

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Operator-facing message rendered into the results pane
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidModelUrl(_) => "Invalid Teachable Machine URL format. \
                 URL should be in the format: \
                 https://teachablemachine.withgoogle.com/models/YOUR_MODEL_ID/"
                .to_string(),
            Error::ModelLoad(err) => {
                format!("{} (Check server logs for details)", err.user_message())
            }
            Error::ModelNotReady => "Model is not ready yet. Please wait a moment.".to_string(),
            Error::Camera(err) => err.user_message().to_string(),
            Error::UnsupportedFileType(_) => {
                "Unsupported file type. Please select an image file.".to_string()
            }
            Error::FileTooLarge { limit, .. } => format!(
                "File is too large. Please choose an image under {} MB.",
                limit / MIB
            ),
            Error::ImageDecode(_) => {
                "Unable to load the selected image. Please try another file.".to_string()
            }
            Error::Inference(_) => "Image prediction failed. Please try another image.".to_string(),
            other => other.to_string(),
        }
    }

    /// Advisory errors are rendered but leave the session mode untouched;
    /// everything else moves the session to `Mode::Error`
    pub fn is_advisory(&self) -> bool {
        matches!(
            self,
            Error::InvalidModelUrl(_)
                | Error::ModelNotReady
                | Error::UnsupportedFileType(_)
                | Error::FileTooLarge { .. }
                | Error::ImageDecode(_)
                | Error::InvalidTransition { .. }
        )
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Error::InvalidModelUrl(_) => (StatusCode::BAD_REQUEST, "INVALID_MODEL_URL"),
            Error::ModelLoad(_) => (StatusCode::BAD_GATEWAY, "MODEL_LOAD_FAILED"),
            Error::ModelNotReady => (StatusCode::CONFLICT, "MODEL_NOT_READY"),
            Error::Camera(_) => (StatusCode::SERVICE_UNAVAILABLE, "CAMERA_ERROR"),
            Error::UnsupportedFileType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_FILE_TYPE")
            }
            Error::FileTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE"),
            Error::ImageDecode(_) => (StatusCode::UNPROCESSABLE_ENTITY, "IMAGE_DECODE_FAILED"),
            Error::Inference(_) => (StatusCode::BAD_GATEWAY, "INFERENCE_FAILED"),
            Error::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            Error::SessionClosed => (StatusCode::SERVICE_UNAVAILABLE, "SESSION_CLOSED"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();
        let message = self.user_message();

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error_code = %error_code,
                error = %self,
                "Request error"
            );
        } else {
            tracing::warn!(
                status = %status,
                error_code = %error_code,
                error = %self,
                "Request rejected"
            );
        }

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
