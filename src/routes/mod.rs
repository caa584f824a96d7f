//! Router configuration.
//!
//! One endpoint: `GET /xiaozhi/v1/` with a standard WebSocket upgrade. No
//! subprotocol is required; provider dispatch happens after the upgrade.

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::handlers::gateway_handler;
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/xiaozhi/v1/", get(gateway_handler))
        .with_state(state)
}
