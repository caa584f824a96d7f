//! Client events sent to the upstream realtime API.

use serde::{Deserialize, Serialize};

use super::types::{
    AudioFormat, InputAudioTranscription, IntOrInf, MessageItem, Modality, Tool, ToolChoice,
    TurnDetection,
};
use crate::protocol::ProtocolError;
use crate::utils::unique_id;

/// Session configuration carried by `session.update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientSession {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modalities: Vec<Modality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<AudioFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<AudioFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,
    /// Serialized even when absent: the upstream distinguishes an explicit
    /// null (disable) from a missing key (keep current).
    #[serde(default)]
    pub turn_detection: Option<TurnDetection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(
        default,
        rename = "max_response_output_tokens",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_output_tokens: Option<IntOrInf>,
}

/// Parameters for `response.create`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseCreateParams {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modalities: Vec<Modality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<AudioFormat>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<IntOrInf>,
}

/// The client half of the upstream vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        session: ClientSession,
    },

    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        /// Base64-encoded PCM.
        audio: String,
    },

    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
    },

    #[serde(rename = "input_audio_buffer.clear")]
    InputAudioBufferClear {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
    },

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        previous_item_id: String,
        item: MessageItem,
    },

    #[serde(rename = "conversation.item.truncate")]
    ConversationItemTruncate {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        item_id: String,
        content_index: u32,
        audio_end_ms: u32,
    },

    #[serde(rename = "conversation.item.delete")]
    ConversationItemDelete {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        item_id: String,
    },

    #[serde(rename = "response.create")]
    ResponseCreate {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response: Option<ResponseCreateParams>,
    },

    #[serde(rename = "response.cancel")]
    ResponseCancel {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
    },
}

impl ClientEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate { .. } => "session.update",
            ClientEvent::InputAudioBufferAppend { .. } => "input_audio_buffer.append",
            ClientEvent::InputAudioBufferCommit { .. } => "input_audio_buffer.commit",
            ClientEvent::InputAudioBufferClear { .. } => "input_audio_buffer.clear",
            ClientEvent::ConversationItemCreate { .. } => "conversation.item.create",
            ClientEvent::ConversationItemTruncate { .. } => "conversation.item.truncate",
            ClientEvent::ConversationItemDelete { .. } => "conversation.item.delete",
            ClientEvent::ResponseCreate { .. } => "response.create",
            ClientEvent::ResponseCancel { .. } => "response.cancel",
        }
    }

    pub fn event_id(&self) -> &str {
        match self {
            ClientEvent::SessionUpdate { event_id, .. }
            | ClientEvent::InputAudioBufferAppend { event_id, .. }
            | ClientEvent::InputAudioBufferCommit { event_id }
            | ClientEvent::InputAudioBufferClear { event_id }
            | ClientEvent::ConversationItemCreate { event_id, .. }
            | ClientEvent::ConversationItemTruncate { event_id, .. }
            | ClientEvent::ConversationItemDelete { event_id, .. }
            | ClientEvent::ResponseCreate { event_id, .. }
            | ClientEvent::ResponseCancel { event_id } => event_id,
        }
    }

    /// Give the event a fresh id unless the caller already set one.
    pub fn stamp(&mut self) {
        let id = match self {
            ClientEvent::SessionUpdate { event_id, .. }
            | ClientEvent::InputAudioBufferAppend { event_id, .. }
            | ClientEvent::InputAudioBufferCommit { event_id }
            | ClientEvent::InputAudioBufferClear { event_id }
            | ClientEvent::ConversationItemCreate { event_id, .. }
            | ClientEvent::ConversationItemTruncate { event_id, .. }
            | ClientEvent::ConversationItemDelete { event_id, .. }
            | ClientEvent::ResponseCreate { event_id, .. }
            | ClientEvent::ResponseCancel { event_id } => event_id,
        };
        if id.is_empty() {
            *id = unique_id();
        }
    }

    /// Serialize for the wire, stamping the event id first.
    pub fn to_json(mut self) -> Result<String, ProtocolError> {
        self.stamp();
        serde_json::to_string(&self).map_err(|_| ProtocolError::InvalidFormat)
    }

    /// Decode one client event.
    ///
    /// `session.update` needs a raw pass over the JSON first: an explicit
    /// `"turn_detection": null` means "switch turn detection off" and maps
    /// to the unspecified sentinel, while an absent key leaves the session
    /// untouched and stays `None`.
    pub fn from_json(data: &str) -> Result<Self, ProtocolError> {
        let mut event: ClientEvent =
            serde_json::from_str(data).map_err(|_| ProtocolError::InvalidFormat)?;

        if let ClientEvent::SessionUpdate { session, .. } = &mut event {
            if session.turn_detection.is_none() {
                let raw: serde_json::Value =
                    serde_json::from_str(data).map_err(|_| ProtocolError::InvalidFormat)?;
                let has_null_key = raw
                    .get("session")
                    .and_then(|s| s.get("turn_detection"))
                    .map(|td| td.is_null())
                    .unwrap_or(false);
                if has_null_key {
                    session.turn_detection = Some(TurnDetection::unspecified());
                }
            }
        }

        Ok(event)
    }
}
