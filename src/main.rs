//! tm-classifier - live Teachable Machine classification server
//!
//! Main entry point.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tm_classifier::{
    camera_device::FfmpegCameraDevice,
    inference_engine::RemoteModelLoader,
    realtime_hub::RealtimeHub,
    resource_manager::BlobStore,
    session_controller::{SessionController, SessionHandle},
    state::{AppConfig, AppState},
    web_api,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const COMMAND_QUEUE: usize = 32;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tm_classifier=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting tm-classifier v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    config.validate()?;
    tracing::info!(
        model_url = %config.model_url,
        inference_url = %config.inference_url,
        camera_uri = %config.camera_uri,
        width = config.webcam_width,
        height = config.webcam_height,
        prediction_interval_ms = config.prediction_interval.as_millis() as u64,
        max_upload_bytes = config.max_upload_bytes,
        "Configuration loaded"
    );

    // Initialize components
    let blobs = Arc::new(BlobStore::new());
    let realtime = Arc::new(RealtimeHub::new());
    let loader =
        RemoteModelLoader::with_timeout(config.inference_url.clone(), config.inference_timeout);
    let camera = FfmpegCameraDevice::new(config.camera_uri.clone())
        .with_ffmpeg_bin(config.ffmpeg_bin.clone())
        .with_startup_timeout(config.camera_startup_timeout);

    // Session controller task
    let controller = SessionController::new(
        config.session_config(),
        loader,
        camera,
        Arc::clone(&realtime),
        Arc::clone(&blobs),
    );
    let (session, commands) = SessionHandle::channel(COMMAND_QUEUE);
    let controller_task = tokio::spawn(controller.run(commands, Some(config.model_url.clone())));

    let addr = format!("{}:{}", config.host, config.port);
    let static_dir = config.static_dir.clone();

    let state = AppState {
        config: Arc::new(config),
        session,
        realtime,
        blobs,
        started_at: Instant::now(),
    };

    let mut app = web_api::create_router(state);

    if let Some(dir) = static_dir {
        let serve_dir =
            ServeDir::new(&dir).not_found_service(ServeFile::new(dir.join("index.html")));
        app = app.fallback_service(serve_dir);
        tracing::info!(static_dir = %dir.display(), "Static file serving enabled");
    }

    let app = app
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Router (and every SessionHandle) is gone; the controller releases its
    // resources once the command channel closes
    match tokio::time::timeout(Duration::from_secs(5), controller_task).await {
        Ok(Ok(())) => tracing::info!("Session controller stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "Session controller task failed"),
        Err(_) => tracing::warn!("Session controller did not stop within 5s"),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
