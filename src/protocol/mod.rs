//! Wire protocols spoken by the gateway: the device vocabulary on one side
//! and the upstream realtime vocabulary on the other. Both are closed
//! tagged unions keyed by a `type` string; decoding is two-pass (peek the
//! discriminator, then decode the payload).

pub mod device;
pub mod upstream;

use thiserror::Error;

/// Errors raised at the codec boundary. These never terminate a session;
/// the connection wrapper answers with a device `error` event and keeps
/// reading.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Malformed JSON or a payload that does not match its discriminator.
    #[error("invalid event format")]
    InvalidFormat,

    /// A discriminator outside the device vocabulary.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),
}
