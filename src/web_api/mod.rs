//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - HTTP API routes onto the session controller
//! - Multipart upload intake
//! - Blob reference serving
//! - WebSocket render event stream

mod routes;

pub use routes::{create_router, upload_body_limit};

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let session_running = state.session.snapshot().await.is_ok();

    let response = HealthResponse {
        status: if session_running { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.started_at.elapsed().as_secs(),
        session_running,
        ws_clients: state.realtime.connection_count(),
    };

    Json(response)
}
