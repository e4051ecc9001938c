//! Backend server endpoint configuration.

use serde::{Deserialize, Serialize};

/// Where the backend lives and how to reach it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP base URL of the backend (REST endpoints and socket upgrade).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path of the event socket endpoint.
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
    /// Timeout for REST requests in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            socket_path: default_socket_path(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:4000".to_string()
}

fn default_socket_path() -> String {
    "/socket.io/".to_string()
}

fn default_request_timeout() -> u64 {
    10
}
