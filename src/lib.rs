//! tm-classifier Library
//!
//! Live image classification session against a hosted Teachable Machine model.
//!
//! ## Architecture
//!
//! 1. ResultRanker - sort, threshold and format raw predictions
//! 2. ResourceManager - exclusive ownership of the camera / image reference
//! 3. SessionMode - mode state machine and status texts
//! 4. InferenceLoop - throttled, cancellable webcam loop
//! 5. SessionController - façade driving the above from one task
//! 6. InferenceEngine - model loading and classification backend
//! 7. CameraDevice - ffmpeg-backed capture
//! 8. RenderSink / RealtimeHub - render events pushed to WebSocket clients
//! 9. WebAPI - REST endpoints
//!
//! ## Design Principles
//!
//! - One active input source at a time, torn down before the next is acquired
//! - At most one inference call in flight; stale results are never rendered

pub mod camera_device;
pub mod error;
pub mod inference_engine;
pub mod inference_loop;
pub mod models;
pub mod realtime_hub;
pub mod render_sink;
pub mod resource_manager;
pub mod result_ranker;
pub mod session_controller;
pub mod session_mode;
pub mod state;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
