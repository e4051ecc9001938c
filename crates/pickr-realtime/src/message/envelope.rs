//! Packet envelope for framing event-channel messages.
//!
//! The channel speaks Engine.IO v4 with Socket.IO v5 packets in the default
//! namespace. Only text frames are used.

use serde::Deserialize;
use serde_json::Value;

/// A named event with its JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFrame {
    /// Event name, e.g. `review:crawl_progress`.
    pub name: String,
    /// First argument after the name, `Null` when absent.
    pub data: Value,
}

impl EventFrame {
    /// Create a new frame.
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Engine.IO open handshake (`0{...}`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Engine.IO session id.
    #[serde(default)]
    pub sid: String,
    /// Server ping interval in milliseconds.
    #[serde(default)]
    pub ping_interval: u64,
    /// Server ping timeout in milliseconds.
    #[serde(default)]
    pub ping_timeout: u64,
    /// Maximum payload size accepted by the server.
    #[serde(default)]
    pub max_payload: u64,
}

/// One decoded text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// `0{...}` transport opened.
    Open(Handshake),
    /// `1` transport closing.
    Close,
    /// `2` heartbeat probe from the server.
    Ping,
    /// `3` heartbeat answer.
    Pong,
    /// `40` namespace connect request (client) or acknowledgement (server).
    Connect(Option<Value>),
    /// `41` namespace disconnect.
    Disconnect,
    /// `42[...]` named event.
    Event(EventFrame),
    /// `44{...}` namespace connect refused.
    ConnectError(Value),
    /// Anything this client does not act on (acks, upgrades, other namespaces).
    Noop,
}
