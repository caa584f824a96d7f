//! Shared application state handed to the axum router.

use std::sync::atomic::{AtomicI64, Ordering};

/// Process-wide counters; per-connection state lives in the connection
/// tasks, never here.
#[derive(Debug, Default)]
pub struct AppState {
    request_counter: AtomicI64,
}

impl AppState {
    /// Count one accepted upgrade and return its ordinal.
    pub fn next_request(&self) -> i64 {
        self.request_counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}
