//! Gateway-level error taxonomy.

use thiserror::Error;

use crate::audio::AudioError;
use crate::protocol::ProtocolError;

/// Everything that can go wrong while servicing one connection.
///
/// Only transport-level failures are fatal to the session; protocol and
/// audio failures surface as a device `error` event while the connection
/// stays open.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("invalid audio params")]
    InvalidAudioParams,

    #[error("audio received before hello")]
    AudioBeforeHello,

    #[error("upstream handshake failed: {0}")]
    UpstreamHandshake(String),

    #[error("upstream connection closed")]
    UpstreamClosed,

    #[error("device write queue closed")]
    WriteQueueClosed,
}

impl GatewayError {
    /// Whether the session must terminate.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GatewayError::UpstreamHandshake(_)
                | GatewayError::UpstreamClosed
                | GatewayError::WriteQueueClosed
        )
    }
}
