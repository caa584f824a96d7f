//! Translating-mode connection wrapper.
//!
//! Per connection the wrapper runs four cooperating tasks: the device read
//! loop (this function's own body), the upstream loop (one task serving
//! both directions of the upstream socket), the device write loop draining
//! the bounded queue, and the idle watcher. One `CancellationToken` fans
//! teardown out to all of them; every trigger is idempotent.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::{self, Message as UpstreamMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::translator::{Outbound, Translator};
use crate::config::{OpenAiSettings, ServerConfig};
use crate::errors::GatewayError;
use crate::protocol::{device, upstream};
use crate::session::Session;

/// Device write queue capacity. Sends block when full: backpressure from
/// the device socket must reach the translator, never drop audio.
const WRITE_QUEUE_SIZE: usize = 1024;

/// Outgoing upstream event queue capacity.
const UPSTREAM_QUEUE_SIZE: usize = 256;

/// Keepalive PING cadence on the device socket.
const PING_INTERVAL: Duration = Duration::from_secs(1);

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Idle-deadline shared between the loops that see traffic and the watcher
/// that enforces quiet-connection timeouts. Disabled when no timeout is
/// configured.
#[derive(Clone)]
pub(crate) struct IdleTimer {
    inner: Option<Arc<IdleInner>>,
}

struct IdleInner {
    deadline: parking_lot::Mutex<tokio::time::Instant>,
    timeout: Duration,
}

impl IdleTimer {
    pub(crate) fn new(timeout: Option<Duration>) -> Self {
        let inner = timeout.map(|timeout| {
            Arc::new(IdleInner {
                deadline: parking_lot::Mutex::new(tokio::time::Instant::now() + timeout),
                timeout,
            })
        });
        Self { inner }
    }

    /// Push the deadline out; called on every read and every drain.
    pub(crate) fn touch(&self) {
        if let Some(inner) = &self.inner {
            *inner.deadline.lock() = tokio::time::Instant::now() + inner.timeout;
        }
    }

    /// Resolves when the connection has been quiet past the deadline;
    /// pends forever when disabled.
    pub(crate) async fn expired(&self) {
        let Some(inner) = &self.inner else {
            return std::future::pending().await;
        };
        loop {
            let deadline = *inner.deadline.lock();
            tokio::time::sleep_until(deadline).await;
            if *inner.deadline.lock() <= tokio::time::Instant::now() {
                return;
            }
        }
    }
}

/// Run one translating session until either side goes away.
pub async fn serve_translating(socket: WebSocket, config: Arc<ServerConfig>) {
    // Upstream handshake failures refuse the connection before any device
    // reply; retry is the device's responsibility.
    let upstream_socket = match connect_upstream(&config.openai).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("refusing connection, upstream handshake failed: {e}");
            return;
        }
    };
    info!(model = %config.openai.model, "upstream session connected");

    let session = Arc::new(Mutex::new(Session::new(
        config.openai.model.clone(),
        config.openai.voice.clone(),
    )));
    let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE_SIZE);
    let (upstream_tx, upstream_rx) = mpsc::channel(UPSTREAM_QUEUE_SIZE);
    let translator = Arc::new(Translator::new(
        session,
        write_tx.clone(),
        upstream_tx,
        config.clone(),
    ));

    let cancel = CancellationToken::new();
    let idle = IdleTimer::new(config.idle_timeout());

    let (device_sink, device_stream) = socket.split();

    let writer = tokio::spawn(write_loop(
        device_sink,
        write_rx,
        idle.clone(),
        cancel.clone(),
    ));
    let upstream_task = tokio::spawn(upstream_loop(
        upstream_socket,
        upstream_rx,
        translator.clone(),
        write_tx.clone(),
        cancel.clone(),
    ));
    let idle_task = tokio::spawn(idle_watch(
        idle.clone(),
        translator.clone(),
        write_tx.clone(),
        cancel.clone(),
    ));

    device_read_loop(device_stream, translator, write_tx, idle, cancel.clone()).await;

    cancel.cancel();
    let _ = tokio::join!(writer, upstream_task, idle_task);
    info!("translating session terminated");
}

/// Device → gateway. Text frames are decoded through the device codec,
/// binary frames become append-buffer events. Read errors and EOF trigger
/// the shutdown sequence.
async fn device_read_loop(
    mut stream: SplitStream<WebSocket>,
    translator: Arc<Translator>,
    write_tx: mpsc::Sender<Outbound>,
    idle: IdleTimer,
    cancel: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            msg = stream.next() => msg,
            _ = cancel.cancelled() => return,
        };
        let Some(Ok(msg)) = msg else {
            debug!("device socket closed");
            return;
        };
        idle.touch();

        let event = match msg {
            Message::Text(text) => match device::ClientEvent::from_text(text.as_str()) {
                Ok(event) => event,
                Err(e) => {
                    warn!("rejecting device frame: {e}");
                    let event = translator.error_event(&e.to_string()).await;
                    if write_tx.send(Outbound::Event(event)).await.is_err() {
                        return;
                    }
                    continue;
                }
            },
            Message::Binary(data) => device::ClientEvent::from_binary(data),
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => return,
        };

        let result = tokio::select! {
            result = translator.dispatch_client_event(event) => result,
            _ = cancel.cancelled() => return,
        };
        if let Err(e) = result {
            if e.is_fatal() {
                warn!("device dispatch failed fatally: {e}");
                return;
            }
            debug!("device dispatch failed: {e}");
            let event = translator.error_event(&e.to_string()).await;
            if write_tx.send(Outbound::Event(event)).await.is_err() {
                return;
            }
        }
    }
}

/// Both directions of the upstream socket: outgoing client events are
/// stamped and written, incoming server events are decoded and dispatched.
async fn upstream_loop(
    socket: UpstreamSocket,
    mut rx: mpsc::Receiver<upstream::ClientEvent>,
    translator: Arc<Translator>,
    write_tx: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
) {
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                trace!(event_type = event.event_type(), "sending upstream event");
                let json = match event.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        error!("failed to serialize upstream event: {e}");
                        continue;
                    }
                };
                if let Err(e) = sink.send(UpstreamMessage::Text(json.into())).await {
                    warn!("upstream write failed: {e}");
                    break;
                }
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(UpstreamMessage::Text(text))) => {
                        let event = match upstream::ServerEvent::from_json(text.as_str()) {
                            Ok(Some(event)) => event,
                            Ok(None) => {
                                trace!("ignoring unknown upstream event type");
                                continue;
                            }
                            Err(e) => {
                                warn!("bad upstream frame: {e}");
                                continue;
                            }
                        };
                        let result = tokio::select! {
                            result = translator.dispatch_server_event(event) => result,
                            _ = cancel.cancelled() => break,
                        };
                        if let Err(e) = result {
                            if e.is_fatal() {
                                warn!("upstream dispatch failed fatally: {e}");
                                break;
                            }
                            debug!("upstream dispatch failed: {e}");
                            let event = translator.error_event(&e.to_string()).await;
                            if write_tx.send(Outbound::Event(event)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(UpstreamMessage::Ping(data))) => {
                        let _ = sink.send(UpstreamMessage::Pong(data)).await;
                    }
                    Some(Ok(UpstreamMessage::Close(_))) | None => {
                        info!("upstream socket closed");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("upstream read failed: {e}");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }

            _ = cancel.cancelled() => break,
        }
    }
    cancel.cancel();
}

/// Gateway → device. Drains the bounded queue FIFO, serializes events to
/// text frames, writes audio frames as binary, and keeps the socket alive
/// with periodic PINGs.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    idle: IdleTimer,
    cancel: CancellationToken,
) {
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            route = rx.recv() => {
                let Some(route) = route else { break };
                let should_close = matches!(route, Outbound::Close);
                let result = match route {
                    Outbound::Event(event) => match event.to_json() {
                        Ok(json) => sink.send(Message::Text(json.into())).await,
                        Err(e) => {
                            error!("failed to serialize device event: {e}");
                            continue;
                        }
                    },
                    Outbound::Audio(frame) => sink.send(Message::Binary(frame)).await,
                    Outbound::Close => sink.send(Message::Close(None)).await,
                };
                if let Err(e) = result {
                    warn!("device write failed: {e}");
                    break;
                }
                idle.touch();
                if should_close {
                    break;
                }
            }
            _ = ping.tick() => {
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
    cancel.cancel();
}

/// Quiet-connection enforcement: one error event, an orderly close, then
/// fan-out teardown.
async fn idle_watch(
    idle: IdleTimer,
    translator: Arc<Translator>,
    write_tx: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = idle.expired() => {
            warn!("closing connection idle past its deadline");
            let event = translator.error_event("too long without operation").await;
            let _ = write_tx.send(Outbound::Event(event)).await;
            let _ = write_tx.send(Outbound::Close).await;
            cancel.cancel();
        }
        _ = cancel.cancelled() => {}
    }
}

/// Dial the upstream realtime endpoint.
pub(crate) async fn connect_upstream(openai: &OpenAiSettings) -> Result<UpstreamSocket, GatewayError> {
    let endpoint = format!("{}?model={}", openai.base_url, openai.model);
    let request = upstream_request(&endpoint, &[("Authorization", format!("Bearer {}", openai.api_key))])?;
    let (socket, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| GatewayError::UpstreamHandshake(e.to_string()))?;
    Ok(socket)
}

/// Build a WebSocket client handshake for `endpoint` with extra headers.
pub(crate) fn upstream_request(
    endpoint: &str,
    headers: &[(&str, String)],
) -> Result<http::Request<()>, GatewayError> {
    let url = url::Url::parse(endpoint)
        .map_err(|e| GatewayError::UpstreamHandshake(e.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| GatewayError::UpstreamHandshake("endpoint has no host".to_string()))?
        .to_string();

    let mut builder = http::Request::builder()
        .uri(endpoint)
        .header("Host", host)
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header(
            "Sec-WebSocket-Key",
            tungstenite::handshake::client::generate_key(),
        );
    for (name, value) in headers {
        builder = builder.header(*name, value);
    }
    builder
        .body(())
        .map_err(|e| GatewayError::UpstreamHandshake(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_idle_timer_fires_after_quiet_period() {
        let idle = IdleTimer::new(Some(Duration::from_secs(5)));
        let expired = tokio::spawn({
            let idle = idle.clone();
            async move { idle.expired().await }
        });
        tokio::time::advance(Duration::from_secs(6)).await;
        expired.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timer_touch_defers_expiry() {
        let idle = IdleTimer::new(Some(Duration::from_secs(5)));
        let watcher = tokio::spawn({
            let idle = idle.clone();
            async move { idle.expired().await }
        });
        tokio::time::advance(Duration::from_secs(3)).await;
        idle.touch();
        tokio::time::advance(Duration::from_secs(3)).await;
        tokio::task::yield_now().await;
        assert!(!watcher.is_finished());
        tokio::time::advance(Duration::from_secs(3)).await;
        watcher.await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_idle_timer_never_fires() {
        let idle = IdleTimer::new(None);
        let fired = tokio::time::timeout(Duration::from_millis(20), idle.expired()).await;
        assert!(fired.is_err());
    }

    #[test]
    fn test_upstream_request_carries_auth_header() {
        let request = upstream_request(
            "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview",
            &[("Authorization", "Bearer sk-test".to_string())],
        )
        .unwrap();
        assert_eq!(request.headers()["Authorization"], "Bearer sk-test");
        assert_eq!(request.headers()["Host"], "api.openai.com");
        assert_eq!(request.headers()["Upgrade"], "websocket");
    }

    #[test]
    fn test_upstream_request_rejects_bad_url() {
        assert!(matches!(
            upstream_request("not a url", &[]),
            Err(GatewayError::UpstreamHandshake(_))
        ));
    }
}
