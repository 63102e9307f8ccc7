//! API Routes

use axum::{
    extract::{
        multipart::MultipartError,
        ws::{Message, WebSocket, WebSocketUpgrade},
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::realtime_hub::RealtimeHub;
use crate::models::{ApiResponse, LoadModelRequest, StopWebcamResponse, VisibilityRequest};
use crate::resource_manager::ImageFile;
use crate::session_controller::SessionSnapshot;
use crate::state::AppState;

/// Multipart framing allowance on top of the image ceiling
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Body limit for `/api/upload`. Files between the ceiling and this limit
/// are read and rejected by the controller; larger bodies are cut off here.
pub fn upload_body_limit(max_upload_bytes: u64) -> usize {
    usize::try_from(max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_mul(2)
        .saturating_add(MULTIPART_OVERHEAD)
}

/// Create API router
pub fn create_router(state: AppState) -> Router {
    let upload_limit = upload_body_limit(state.config.max_upload_bytes);

    Router::new()
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/session", get(get_session))
        // Model
        .route("/api/model", post(load_model))
        // Input sources
        .route("/api/webcam/start", post(start_webcam))
        .route("/api/webcam/stop", post(stop_webcam))
        .route(
            "/api/upload",
            post(upload_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/visibility", post(set_visibility))
        .route("/api/images/:id", get(get_image))
        // WebSocket
        .route("/api/ws", get(websocket_handler))
        .with_state(state)
}

// ========================================
// Session
// ========================================

async fn get_session(State(state): State<AppState>) -> Result<Json<ApiResponse<SessionSnapshot>>> {
    let snapshot = state.session.snapshot().await?;
    Ok(Json(ApiResponse::success(snapshot)))
}

async fn load_model(
    State(state): State<AppState>,
    Json(req): Json<LoadModelRequest>,
) -> Result<Json<ApiResponse<SessionSnapshot>>> {
    tracing::info!(model_url = %req.url, "Model load requested");
    state.session.load_model(req.url).await?;
    get_session(State(state)).await
}

async fn start_webcam(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<SessionSnapshot>>> {
    state.session.start_webcam().await?;
    get_session(State(state)).await
}

async fn stop_webcam(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<StopWebcamResponse>>> {
    let released = state.session.stop_webcam().await?;
    Ok(Json(ApiResponse::success(StopWebcamResponse { released })))
}

async fn set_visibility(
    State(state): State<AppState>,
    Json(req): Json<VisibilityRequest>,
) -> Result<Json<ApiResponse<SessionSnapshot>>> {
    state.session.set_visibility(req.hidden).await?;
    get_session(State(state)).await
}

// ========================================
// Upload
// ========================================

/// Accepts exactly one `image` field; further fields are ignored
async fn upload_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<ApiResponse<SessionSnapshot>>> {
    let file = match read_image_field(multipart).await {
        Ok(file) => file,
        Err(e) => {
            let limit = upload_body_limit(state.config.max_upload_bytes) as u64;
            let declared = content_length(&headers);
            let over_limit = e.status() == StatusCode::PAYLOAD_TOO_LARGE
                || declared.is_some_and(|len| len > limit);
            if over_limit {
                tracing::warn!(declared = ?declared, limit = limit, "Upload body over limit");
                let size = declared.unwrap_or(limit + 1);
                return Err(state.session.reject_upload(size).await);
            }
            return Err(Error::Validation(format!(
                "invalid multipart body: {}",
                e.body_text()
            )));
        }
    };

    let file = file.ok_or_else(|| {
        Error::Validation("multipart field `image` is required".to_string())
    })?;
    state.session.submit_image(file).await?;
    get_session(State(state)).await
}

async fn read_image_field(
    mut multipart: Multipart,
) -> std::result::Result<Option<ImageFile>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;

        let mut image = ImageFile::new(content_type, bytes.to_vec());
        if let Some(name) = file_name {
            image = image.with_file_name(name);
        }
        return Ok(Some(image));
    }
    Ok(None)
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let (content_type, data) = state
        .blobs
        .get(&id)
        .ok_or_else(|| Error::NotFound(format!("image {}", id)))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        data.to_vec(),
    ))
}

// ========================================
// WebSocket
// ========================================

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // sockets hold the hub only, never a session handle
    let realtime = Arc::clone(&state.realtime);
    ws.on_upgrade(move |socket| handle_websocket(socket, realtime))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, realtime: Arc<RealtimeHub>) {
    let (mut sender, mut receiver) = socket.split();

    // Register with RealtimeHub
    let (conn_id, mut rx) = realtime.register();

    // Forward render events from hub to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // Incoming messages are only watched for close
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    realtime.unregister(&conn_id);
}
