//! Upstream realtime protocol: JSON events over one WebSocket per session.

pub mod client_event;
pub mod server_event;
pub mod types;

pub use client_event::{ClientEvent, ClientSession};
pub use server_event::ServerEvent;
pub use types::{
    ApiError, AudioFormat, ContentPart, ContentType, Conversation, IntOrInf, ItemStatus,
    ItemType, MessageItem, MessageRole, Modality, RateLimit, Response, ResponseStatus,
    ServerSession, Tool, ToolChoice, ToolChoiceFunction, TurnDetection, TurnDetectionType, Usage,
};
