//! Connectivity state of the event channel.

use serde::{Deserialize, Serialize};

/// Connection lifecycle as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    /// `connect()` has not been called yet.
    #[default]
    Idle,
    /// First connection attempt in progress.
    Connecting,
    /// Channel is open and the namespace handshake completed.
    Connected,
    /// Channel dropped; waiting to retry.
    Reconnecting {
        /// 1-based reconnection attempt about to be made.
        attempt: u32,
    },
    /// Torn down on request.
    Disconnected,
    /// Reconnection attempts exhausted. Stores may be stale.
    Failed,
}

impl ConnectionState {
    /// Whether events can currently flow.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Short label for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        }
    }
}
