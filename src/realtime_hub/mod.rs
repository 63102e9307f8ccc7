//! RealtimeHub - WebSocket distribution of render events
//!
//! ## Responsibilities
//!
//! - WebSocket connection management
//! - Render event broadcasting (mode, busy indicator, results, media view)
//! - Replay of the current mode, results and media to newly connected clients
//!
//! Note: uploaded image bytes are never pushed over the socket. Clients fetch
//! them via HTTP GET /api/images/{id} from the `media` event URL.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::render_sink::{RenderEvent, RenderSink};

/// Client connection
struct ClientConnection {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

/// Last event of each replayed kind, already serialized
#[derive(Default)]
struct LatestState {
    mode: Option<String>,
    results: Option<String>,
    media: Option<String>,
}

/// RealtimeHub instance
pub struct RealtimeHub {
    connections: RwLock<HashMap<Uuid, ClientConnection>>,
    connection_count: AtomicU64,
    latest: RwLock<LatestState>,
}

impl RealtimeHub {
    /// Create new RealtimeHub
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            connection_count: AtomicU64::new(0),
            latest: RwLock::new(LatestState::default()),
        }
    }

    /// Register a new client; the current state is queued for it immediately
    pub fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        {
            // held until the client is listed, so no broadcast slips between
            let latest = self.latest.read().unwrap_or_else(PoisonError::into_inner);
            for json in [&latest.mode, &latest.media, &latest.results]
                .into_iter()
                .flatten()
            {
                let _ = tx.send(json.clone());
            }

            self.connections
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id, ClientConnection { id, tx });
        }
        self.connection_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(connection_id = %id, "Client connected");

        (id, rx)
    }

    /// Unregister a client
    pub fn unregister(&self, id: &Uuid) {
        let removed = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some();

        if removed {
            self.connection_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(connection_id = %id, "Client disconnected");
        }
    }

    /// Broadcast event to all clients
    pub fn broadcast(&self, event: &RenderEvent) {
        let json = match serde_json::to_string(event) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize render event");
                return;
            }
        };

        self.remember(event, &json);

        let connections = self.connections.read().unwrap_or_else(PoisonError::into_inner);
        tracing::trace!(
            message_type = %message_type(event),
            client_count = connections.len(),
            "Broadcasting render event"
        );

        for conn in connections.values() {
            if let Err(e) = conn.tx.send(json.clone()) {
                tracing::warn!(connection_id = %conn.id, error = %e, "Failed to send message");
            }
        }
    }

    /// Get connection count
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }

    fn remember(&self, event: &RenderEvent, json: &str) {
        let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        let slot = match event {
            RenderEvent::ModeChanged(_) => &mut latest.mode,
            RenderEvent::Results(_) => &mut latest.results,
            RenderEvent::Media(_) => &mut latest.media,
            RenderEvent::Busy(_) => return,
        };
        *slot = Some(json.to_string());
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSink for RealtimeHub {
    fn render(&self, event: RenderEvent) {
        self.broadcast(&event);
    }
}

fn message_type(event: &RenderEvent) -> &'static str {
    match event {
        RenderEvent::ModeChanged(_) => "mode_changed",
        RenderEvent::Busy(_) => "busy",
        RenderEvent::Results(_) => "results",
        RenderEvent::Media(_) => "media",
    }
}
