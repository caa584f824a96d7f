//! Passthrough mode: a byte-level WebSocket splice between the device and
//! the configured xiaozhi upstream. No translation, no transcoding; the
//! client's identifying headers are forwarded on the upstream handshake.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::http::HeaderMap;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::connection::upstream_request;
use crate::config::ServerConfig;

/// Request headers relayed verbatim to the upstream.
const FORWARDED_HEADERS: &[&str] = &[
    "Authorization",
    "Protocol-Version",
    "Device-Id",
    "Client-Id",
];

/// Client headers captured at upgrade time for the upstream handshake.
#[derive(Debug, Clone, Default)]
pub struct ForwardHeaders {
    entries: Vec<(&'static str, String)>,
}

impl ForwardHeaders {
    pub fn from_request(headers: &HeaderMap) -> Self {
        let mut entries = Vec::new();
        for name in FORWARDED_HEADERS {
            if let Some(value) = headers.get(*name).and_then(|v| v.to_str().ok()) {
                entries.push((*name, value.to_string()));
            }
        }
        Self { entries }
    }

    fn as_slice(&self) -> &[(&'static str, String)] {
        &self.entries
    }
}

/// Splice one device connection onto the configured upstream.
pub async fn serve_passthrough(
    socket: WebSocket,
    forward: ForwardHeaders,
    config: Arc<ServerConfig>,
) {
    let base_url = &config.provider.xiaozhi_base_url;
    if base_url.is_empty() {
        error!("passthrough mode without provider.xiaozhi.base_url, dropping connection");
        return;
    }

    let request = match upstream_request(base_url, forward.as_slice()) {
        Ok(request) => request,
        Err(e) => {
            error!("bad passthrough upstream url: {e}");
            return;
        }
    };
    let upstream = match tokio_tungstenite::connect_async(request).await {
        Ok((socket, _response)) => socket,
        Err(e) => {
            error!("passthrough upstream handshake failed: {e}");
            return;
        }
    };
    info!(upstream = %base_url, "passthrough session connected");

    let (mut up_sink, mut up_stream) = upstream.split();
    let (mut dev_sink, mut dev_stream) = socket.split();
    let cancel = CancellationToken::new();

    // Device → upstream.
    let uplink = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    msg = dev_stream.next() => msg,
                    _ = cancel.cancelled() => break,
                };
                let Some(Ok(msg)) = msg else { break };
                let relay = match msg {
                    Message::Text(text) => UpstreamMessage::Text(text.to_string().into()),
                    Message::Binary(data) => UpstreamMessage::Binary(data),
                    Message::Close(_) => break,
                    _ => continue,
                };
                if let Err(e) = up_sink.send(relay).await {
                    warn!("passthrough upstream write failed: {e}");
                    break;
                }
            }
            cancel.cancel();
        })
    };

    // Upstream → device.
    let downlink = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    msg = up_stream.next() => msg,
                    _ = cancel.cancelled() => break,
                };
                let Some(Ok(msg)) = msg else { break };
                let relay = match msg {
                    UpstreamMessage::Text(text) => Message::Text(text.to_string().into()),
                    UpstreamMessage::Binary(data) => Message::Binary(data),
                    UpstreamMessage::Close(_) => break,
                    _ => continue,
                };
                if let Err(e) = dev_sink.send(relay).await {
                    debug!("passthrough device write failed: {e}");
                    break;
                }
            }
            cancel.cancel();
            let _ = dev_sink.send(Message::Close(None)).await;
        })
    };

    let _ = tokio::join!(uplink, downlink);
    info!("passthrough session terminated");
}
