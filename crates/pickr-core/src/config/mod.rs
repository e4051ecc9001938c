//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod app;
pub mod logging;
pub mod realtime;

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

pub use self::app::ServerConfig;
pub use self::logging::LoggingConfig;
pub use self::realtime::RealtimeConfig;

use crate::error::AppError;

/// Engine.IO query appended to the socket URL.
const SOCKET_QUERY: &str = "EIO=4&transport=websocket";

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backend endpoint settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Real-time sync client settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `PICKR__`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(environment())
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        Self::finish(config)
    }

    /// Load configuration from one explicit file, still honoring `PICKR__` overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(environment())
            .build()
            .map_err(|e| {
                AppError::configuration(format!(
                    "Failed to read config '{}': {e}",
                    path.display()
                ))
            })?;

        Self::finish(config)
    }

    fn finish(config: config::Config) -> Result<Self, AppError> {
        let parsed: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Check cross-field constraints the schema alone cannot express.
    pub fn validate(&self) -> Result<(), AppError> {
        let base = self.base_url()?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(AppError::configuration(format!(
                "server.base_url must be http or https, got '{}'",
                base.scheme()
            )));
        }
        if self.realtime.reconnect_delay_ms == 0 {
            return Err(AppError::configuration(
                "realtime.reconnect_delay_ms must be greater than zero",
            ));
        }
        if self.realtime.completion_grace_ms == 0 {
            return Err(AppError::configuration(
                "realtime.completion_grace_ms must be greater than zero",
            ));
        }
        if self.realtime.channel_buffer_size == 0 {
            return Err(AppError::configuration(
                "realtime.channel_buffer_size must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Parsed HTTP base URL.
    pub fn base_url(&self) -> Result<Url, AppError> {
        Ok(Url::parse(&self.server.base_url)?)
    }

    /// WebSocket URL of the event channel, derived from the HTTP base URL.
    pub fn socket_url(&self) -> Result<Url, AppError> {
        let mut url = self.base_url()?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| AppError::configuration("Cannot derive socket URL scheme"))?;
        url.set_path(&self.server.socket_path);
        url.set_query(Some(SOCKET_QUERY));
        Ok(url)
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("PICKR")
        .separator("__")
        .try_parsing(true)
}
