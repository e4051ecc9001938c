//! Real-time sync client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Real-time (event channel) client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Reconnection attempts after the channel drops (or the first connect fails).
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    /// Fixed delay between reconnection attempts in milliseconds.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// Grace window between a job reaching 100% and its completed transition.
    #[serde(default = "default_completion_grace")]
    pub completion_grace_ms: u64,
    /// How long terminal jobs and failed queue items stay visible.
    #[serde(default = "default_terminal_retention")]
    pub terminal_retention_ms: u64,
    /// How long to wait for a `*:current_state` answer before giving up.
    #[serde(default = "default_snapshot_timeout")]
    pub snapshot_timeout_ms: u64,
    /// Internal channel buffer size (inbound frames, outbound frames, commands).
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
    /// Maximum accepted frame size in bytes.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl RealtimeConfig {
    /// Delay between reconnection attempts.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Completion grace window.
    pub fn completion_grace(&self) -> Duration {
        Duration::from_millis(self.completion_grace_ms)
    }

    /// Terminal retention window.
    pub fn terminal_retention(&self) -> Duration {
        Duration::from_millis(self.terminal_retention_ms)
    }

    /// Snapshot answer timeout.
    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.snapshot_timeout_ms)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay(),
            completion_grace_ms: default_completion_grace(),
            terminal_retention_ms: default_terminal_retention(),
            snapshot_timeout_ms: default_snapshot_timeout(),
            channel_buffer_size: default_channel_buffer(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_delay() -> u64 {
    1000
}

fn default_completion_grace() -> u64 {
    3000
}

fn default_terminal_retention() -> u64 {
    3000
}

fn default_snapshot_timeout() -> u64 {
    10_000
}

fn default_channel_buffer() -> usize {
    256
}

fn default_max_frame_bytes() -> usize {
    1024 * 1024
}
