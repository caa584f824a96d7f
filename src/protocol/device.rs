//! Device-protocol events.
//!
//! Text frames are JSON objects discriminated by `type`; binary frames are
//! implicitly `append_buffer` events carrying one compressed audio frame
//! each and are never rejected by schema.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::ProtocolError;

/// Audio negotiation block exchanged in both hello directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioParams {
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub sample_rate: u32,
    #[serde(default)]
    pub channels: u8,
    /// Frame duration in milliseconds.
    #[serde(default)]
    pub frame_duration: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenState {
    Start,
    Stop,
    Detect,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenMode {
    Auto,
    Manual,
    Realtime,
}

/// Events flowing device → gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientEvent {
    Hello {
        #[serde(default)]
        version: u32,
        #[serde(default)]
        transport: String,
        #[serde(default)]
        audio_params: Option<AudioParams>,
    },
    Listen {
        state: ListenState,
        #[serde(default)]
        mode: Option<ListenMode>,
    },
    Abort {
        #[serde(default)]
        reason: String,
    },
    Iot {
        #[serde(default)]
        data: serde_json::Value,
    },
    /// One compressed audio frame, delivered as a binary WebSocket message.
    #[serde(skip)]
    AppendBuffer(Bytes),
}

impl ClientEvent {
    /// Decode one inbound text frame. Two-pass: the discriminator is peeked
    /// first so an unknown type is reported as such rather than as a
    /// generic parse failure.
    pub fn from_text(data: &str) -> Result<Self, ProtocolError> {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(rename = "type")]
            kind: Option<String>,
        }
        let probe: Probe =
            serde_json::from_str(data).map_err(|_| ProtocolError::InvalidFormat)?;
        match probe.kind.as_deref() {
            Some("hello") | Some("listen") | Some("abort") | Some("iot") => {
                serde_json::from_str(data).map_err(|_| ProtocolError::InvalidFormat)
            }
            Some(other) => Err(ProtocolError::UnknownEventType(other.to_string())),
            None => Err(ProtocolError::InvalidFormat),
        }
    }

    /// Wrap one binary frame. Binary input is never rejected.
    pub fn from_binary(data: Bytes) -> Self {
        ClientEvent::AppendBuffer(data)
    }
}

/// Sub-state carried by `tts` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsState {
    Start,
    Stop,
    SentenceStart,
    SentenceEnd,
}

/// Events flowing gateway → device. Every event carries the session id the
/// upstream assigned (empty until the session exists).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    Error {
        error: String,
        #[serde(default)]
        session_id: String,
    },
    Hello {
        transport: String,
        audio_params: AudioParams,
        #[serde(default)]
        session_id: String,
    },
    Stt {
        text: String,
        #[serde(default)]
        session_id: String,
    },
    Llm {
        text: String,
        emotion: String,
        #[serde(default)]
        session_id: String,
    },
    Tts {
        state: TtsState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sample_rate: Option<u32>,
        #[serde(default)]
        session_id: String,
    },
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|_| ProtocolError::InvalidFormat)
    }
}
