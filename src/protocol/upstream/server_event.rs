//! Server events received from the upstream realtime API.

use serde::{Deserialize, Serialize};

use super::types::{
    ApiError, ContentPart, Conversation, MessageItem, RateLimit, Response, ServerSession,
};
use crate::protocol::ProtocolError;

/// The server half of the upstream vocabulary.
///
/// Unknown event types are ignored by `from_json` so new upstream releases
/// cannot break a running gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "error")]
    Error {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        error: ApiError,
    },

    #[serde(rename = "session.created")]
    SessionCreated {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        session: ServerSession,
    },

    #[serde(rename = "session.updated")]
    SessionUpdated {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        session: ServerSession,
    },

    #[serde(rename = "conversation.created")]
    ConversationCreated {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        conversation: Conversation,
    },

    #[serde(rename = "input_audio_buffer.committed")]
    InputAudioBufferCommitted {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        previous_item_id: String,
        item_id: String,
    },

    #[serde(rename = "input_audio_buffer.cleared")]
    InputAudioBufferCleared {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
    },

    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        audio_start_ms: i64,
        item_id: String,
    },

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        audio_end_ms: i64,
        item_id: String,
    },

    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        previous_item_id: String,
        item: MessageItem,
    },

    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputAudioTranscriptionCompleted {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        item_id: String,
        #[serde(default)]
        content_index: u32,
        transcript: String,
    },

    #[serde(rename = "conversation.item.input_audio_transcription.failed")]
    InputAudioTranscriptionFailed {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        item_id: String,
        #[serde(default)]
        content_index: u32,
        error: ApiError,
    },

    #[serde(rename = "conversation.item.truncated")]
    ConversationItemTruncated {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        item_id: String,
        #[serde(default)]
        content_index: u32,
        #[serde(default)]
        audio_end_ms: u32,
    },

    #[serde(rename = "conversation.item.deleted")]
    ConversationItemDeleted {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        item_id: String,
    },

    #[serde(rename = "response.created")]
    ResponseCreated {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        response: Response,
    },

    #[serde(rename = "response.cancelled")]
    ResponseCancelled {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
    },

    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        response: Response,
    },

    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        response_id: String,
        #[serde(default)]
        output_index: u32,
        item: MessageItem,
    },

    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        response_id: String,
        #[serde(default)]
        output_index: u32,
        item: MessageItem,
    },

    #[serde(rename = "response.content_part.added")]
    ContentPartAdded {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        response_id: String,
        item_id: String,
        #[serde(default)]
        output_index: u32,
        #[serde(default)]
        content_index: u32,
        part: ContentPart,
    },

    #[serde(rename = "response.content_part.done")]
    ContentPartDone {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        response_id: String,
        item_id: String,
        #[serde(default)]
        output_index: u32,
        #[serde(default)]
        content_index: u32,
        part: ContentPart,
    },

    #[serde(rename = "response.text.delta")]
    TextDelta {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        response_id: String,
        item_id: String,
        #[serde(default)]
        output_index: u32,
        #[serde(default)]
        content_index: u32,
        delta: String,
    },

    #[serde(rename = "response.text.done")]
    TextDone {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        response_id: String,
        item_id: String,
        #[serde(default)]
        output_index: u32,
        #[serde(default)]
        content_index: u32,
        text: String,
    },

    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        response_id: String,
        item_id: String,
        #[serde(default)]
        output_index: u32,
        #[serde(default)]
        content_index: u32,
        delta: String,
    },

    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        response_id: String,
        item_id: String,
        #[serde(default)]
        output_index: u32,
        #[serde(default)]
        content_index: u32,
        transcript: String,
    },

    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        response_id: String,
        item_id: String,
        #[serde(default)]
        output_index: u32,
        #[serde(default)]
        content_index: u32,
        /// Base64-encoded PCM.
        delta: String,
    },

    #[serde(rename = "response.audio.done")]
    AudioDone {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        response_id: String,
        item_id: String,
        #[serde(default)]
        output_index: u32,
        #[serde(default)]
        content_index: u32,
    },

    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        response_id: String,
        item_id: String,
        #[serde(default)]
        output_index: u32,
        call_id: String,
        delta: String,
    },

    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        response_id: String,
        item_id: String,
        #[serde(default)]
        output_index: u32,
        call_id: String,
        arguments: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        name: String,
    },

    #[serde(rename = "rate_limits.updated")]
    RateLimitsUpdated {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        event_id: String,
        rate_limits: Vec<RateLimit>,
    },
}

/// Every discriminator this gateway understands.
const KNOWN_TYPES: &[&str] = &[
    "error",
    "session.created",
    "session.updated",
    "conversation.created",
    "input_audio_buffer.committed",
    "input_audio_buffer.cleared",
    "input_audio_buffer.speech_started",
    "input_audio_buffer.speech_stopped",
    "conversation.item.created",
    "conversation.item.input_audio_transcription.completed",
    "conversation.item.input_audio_transcription.failed",
    "conversation.item.truncated",
    "conversation.item.deleted",
    "response.created",
    "response.cancelled",
    "response.done",
    "response.output_item.added",
    "response.output_item.done",
    "response.content_part.added",
    "response.content_part.done",
    "response.text.delta",
    "response.text.done",
    "response.audio_transcript.delta",
    "response.audio_transcript.done",
    "response.audio.delta",
    "response.audio.done",
    "response.function_call_arguments.delta",
    "response.function_call_arguments.done",
    "rate_limits.updated",
];

impl ServerEvent {
    /// Decode one upstream frame. `Ok(None)` means the discriminator is
    /// outside the known vocabulary and the event should be dropped.
    pub fn from_json(data: &str) -> Result<Option<Self>, ProtocolError> {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(rename = "type")]
            kind: String,
        }
        let probe: Probe =
            serde_json::from_str(data).map_err(|_| ProtocolError::InvalidFormat)?;
        if !KNOWN_TYPES.contains(&probe.kind.as_str()) {
            return Ok(None);
        }
        serde_json::from_str(data)
            .map(Some)
            .map_err(|_| ProtocolError::InvalidFormat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::upstream::types::ContentType;

    #[test]
    fn test_decode_session_created() {
        let ev = ServerEvent::from_json(
            r#"{"type":"session.created",
                "session":{"id":"sess_9","object":"realtime.session","model":"gpt-4o-realtime-preview"}}"#,
        )
        .unwrap()
        .expect("known type");
        match ev {
            ServerEvent::SessionCreated { session, .. } => assert_eq!(session.id, "sess_9"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let ev = ServerEvent::from_json(r#"{"type":"output_audio_buffer.started"}"#).unwrap();
        assert!(ev.is_none());
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        assert!(ServerEvent::from_json(r#"{"type":"session.created"}"#).is_err());
        assert!(ServerEvent::from_json("{").is_err());
    }

    #[test]
    fn test_roundtrip_response_lifecycle_variants() {
        let events = vec![
            ServerEvent::InputAudioBufferCommitted {
                event_id: "e1".into(),
                previous_item_id: String::new(),
                item_id: "item_1".into(),
            },
            ServerEvent::AudioTranscriptDone {
                event_id: "e2".into(),
                response_id: "resp_1".into(),
                item_id: "item_2".into(),
                output_index: 0,
                content_index: 0,
                transcript: "hello".into(),
            },
            ServerEvent::ContentPartDone {
                event_id: "e3".into(),
                response_id: "resp_1".into(),
                item_id: "item_2".into(),
                output_index: 0,
                content_index: 0,
                part: ContentPart {
                    kind: ContentType::Audio,
                    text: None,
                    audio: None,
                    transcript: Some("hello".into()),
                },
            },
            ServerEvent::AudioDelta {
                event_id: "e4".into(),
                response_id: "resp_1".into(),
                item_id: "item_2".into(),
                output_index: 0,
                content_index: 0,
                delta: "AAAA".into(),
            },
            ServerEvent::ResponseDone {
                event_id: "e5".into(),
                response: Response::default(),
            },
            ServerEvent::RateLimitsUpdated {
                event_id: "e6".into(),
                rate_limits: vec![RateLimit {
                    name: "tokens".into(),
                    limit: 1000,
                    remaining: 999,
                    reset_seconds: 1.5,
                }],
            },
        ];
        for ev in events {
            let json = serde_json::to_string(&ev).unwrap();
            let back = ServerEvent::from_json(&json).unwrap().expect("known type");
            assert_eq!(back, ev);
        }
    }

    #[test]
    fn test_every_known_type_has_a_variant() {
        assert_eq!(KNOWN_TYPES.len(), 29);
    }
}
