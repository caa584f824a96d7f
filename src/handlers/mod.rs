//! Connection handling: the WebSocket endpoint, the per-connection session
//! pipeline and the event translation layer.

pub mod connection;
pub mod gateway;
pub mod passthrough;
pub mod translator;

pub use gateway::gateway_handler;
pub use translator::{Outbound, Translator};
