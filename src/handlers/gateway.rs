//! Device-facing WebSocket endpoint.
//!
//! Upgrades the HTTP connection and hands the socket to the translating
//! session pipeline or the passthrough splice, depending on the configured
//! provider.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use tracing::info;

use super::connection::serve_translating;
use super::passthrough::{serve_passthrough, ForwardHeaders};
use crate::config;
use crate::state::AppState;

/// Maximum WebSocket frame size (10 MB).
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB).
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// `GET /xiaozhi/v1/` — WebSocket upgrade for one device session.
pub async fn gateway_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let connection = state.next_request();
    let config = config::snapshot();
    info!(
        connection,
        provider = %config.provider.name,
        "device WebSocket upgrade requested"
    );

    // Captured before the upgrade consumes the request; only used by
    // passthrough mode.
    let forward = ForwardHeaders::from_request(&headers);

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| async move {
            if config.is_translating() {
                serve_translating(socket, config).await;
            } else {
                serve_passthrough(socket, forward, config).await;
            }
            info!(connection, "device WebSocket terminated");
        })
}
