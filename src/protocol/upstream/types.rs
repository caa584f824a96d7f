//! Shared scalar and structure types of the upstream protocol.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A token budget that is either a concrete integer or the `"inf"`
/// sentinel. Serializes as the string `"inf"` at the sentinel and as a
/// plain JSON number otherwise, and round-trips exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntOrInf(i64);

impl IntOrInf {
    pub const INF: IntOrInf = IntOrInf(i64::MAX);

    pub fn new(value: i64) -> Self {
        IntOrInf(value)
    }

    pub fn is_inf(&self) -> bool {
        *self == Self::INF
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl From<i64> for IntOrInf {
    fn from(value: i64) -> Self {
        IntOrInf(value)
    }
}

impl Serialize for IntOrInf {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_inf() {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_i64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for IntOrInf {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IntOrInfVisitor;

        impl<'de> Visitor<'de> for IntOrInfVisitor {
            type Value = IntOrInf;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an integer or the string \"inf\"")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<IntOrInf, E> {
                Ok(IntOrInf(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<IntOrInf, E> {
                Ok(IntOrInf(v as i64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<IntOrInf, E> {
                if v == "inf" {
                    Ok(IntOrInf::INF)
                } else {
                    Err(E::invalid_value(de::Unexpected::Str(v), &self))
                }
            }
        }

        deserializer.deserialize_any(IntOrInfVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    Pcm16,
    G711Ulaw,
    G711Alaw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Audio,
}

/// Turn-detection discriminator. `Unspecified` is the tri-state sentinel a
/// client signals with an explicit `"turn_detection": null` — distinct from
/// leaving the field out entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnDetectionType {
    #[serde(rename = "server_vad")]
    ServerVad,
    #[serde(rename = "none")]
    None,
    #[serde(rename = "")]
    Unspecified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: TurnDetectionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_padding_ms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silence_duration_ms: Option<u32>,
}

impl TurnDetection {
    pub fn server_vad() -> Self {
        Self {
            kind: TurnDetectionType::ServerVad,
            threshold: None,
            prefix_padding_ms: None,
            silence_duration_ms: None,
        }
    }

    pub fn unspecified() -> Self {
        Self {
            kind: TurnDetectionType::Unspecified,
            threshold: None,
            prefix_padding_ms: None,
            silence_duration_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolChoiceFunction {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolFunction,
}

/// How the model chooses tools: a bare mode string (`"auto"`, `"none"`,
/// `"required"`) or a specific function object. Decoding tries the object
/// form first and falls back to the string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Function(ToolChoiceFunction),
    Mode(String),
}

impl ToolChoice {
    pub fn required() -> Self {
        ToolChoice::Mode("required".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    Assistant,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Message,
    FunctionCall,
    FunctionCallOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    InProgress,
    Completed,
    Incomplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Audio,
    InputText,
    InputAudio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64-encoded audio payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageItem {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
}

/// Error details attached to upstream `error` events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub param: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event_id: String,
}

/// Session descriptor as the upstream reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerSession {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modalities: Vec<Modality>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<AudioFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<AudioFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    InProgress,
    Completed,
    Cancelled,
    Incomplete,
    Failed,
}

impl Default for ResponseStatus {
    fn default() -> Self {
        ResponseStatus::InProgress
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub total_tokens: u32,
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<MessageItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    pub name: String,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub remaining: u64,
    #[serde(default)]
    pub reset_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_or_inf_sentinel_roundtrip() {
        let json = serde_json::to_string(&IntOrInf::INF).unwrap();
        assert_eq!(json, "\"inf\"");
        let back: IntOrInf = serde_json::from_str(&json).unwrap();
        assert!(back.is_inf());
    }

    #[test]
    fn test_int_or_inf_number_roundtrip() {
        let json = serde_json::to_string(&IntOrInf::new(4096)).unwrap();
        assert_eq!(json, "4096");
        let back: IntOrInf = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value(), 4096);
    }

    #[test]
    fn test_int_or_inf_rejects_other_strings() {
        assert!(serde_json::from_str::<IntOrInf>("\"lots\"").is_err());
    }

    #[test]
    fn test_tool_choice_parses_object_then_string() {
        let obj: ToolChoice = serde_json::from_str(
            r#"{"type":"function","function":{"name":"get_weather"}}"#,
        )
        .unwrap();
        assert!(matches!(
            obj,
            ToolChoice::Function(ref f) if f.function.name == "get_weather"
        ));

        let s: ToolChoice = serde_json::from_str("\"required\"").unwrap();
        assert_eq!(s, ToolChoice::required());
    }

    #[test]
    fn test_turn_detection_unspecified_serializes_empty_type() {
        let json = serde_json::to_string(&TurnDetection::unspecified()).unwrap();
        assert!(json.contains(r#""type":"""#));
        let back: TurnDetection = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, TurnDetectionType::Unspecified);
    }

    #[test]
    fn test_server_session_roundtrip() {
        let sess = ServerSession {
            id: "sess_1".into(),
            object: "realtime.session".into(),
            model: "gpt-4o-realtime-preview".into(),
            modalities: vec![Modality::Text, Modality::Audio],
            voice: Some("alloy".into()),
            input_audio_format: Some(AudioFormat::Pcm16),
            output_audio_format: Some(AudioFormat::Pcm16),
            turn_detection: Some(TurnDetection::server_vad()),
            max_output_tokens: Some(IntOrInf::INF),
            ..Default::default()
        };
        let json = serde_json::to_string(&sess).unwrap();
        assert!(json.contains("\"max_response_output_tokens\":\"inf\""));
        let back: ServerSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sess);
    }
}
