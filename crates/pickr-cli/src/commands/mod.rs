//! CLI command definitions and dispatch.

pub mod cancel;
pub mod config;
pub mod status;
pub mod watch;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use pickr_core::config::AppConfig;
use pickr_core::error::AppError;
use pickr_realtime::connection::WsConnector;
use pickr_realtime::{CrawlerApi, SyncClient, SyncHandle};

/// Pickr: watch and control crawl jobs
#[derive(Debug, Parser)]
#[command(name = "pickr", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Live view of jobs and queue until Ctrl-C
    Watch(watch::WatchArgs),
    /// Print jobs and queue once
    Status(status::StatusArgs),
    /// Cancel a queue entry
    Cancel(cancel::CancelArgs),
    /// Configuration management
    Config(config::ConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        match &self.command {
            Commands::Watch(args) => watch::execute(args, &self.config, self.format).await,
            Commands::Status(args) => status::execute(args, &self.config, self.format).await,
            Commands::Cancel(args) => cancel::execute(args, &self.config).await,
            Commands::Config(args) => config::execute(args, &self.config, self.format).await,
        }
    }
}

/// Helper: load configuration from file, falling back to defaults when the
/// file does not exist
pub fn load_config(config_path: &str) -> Result<AppConfig, AppError> {
    if Path::new(config_path).exists() {
        AppConfig::load_from(config_path)
    } else {
        tracing::debug!(path = %config_path, "Config file not found, using defaults");
        let config = AppConfig::default();
        config.validate()?;
        Ok(config)
    }
}

/// Helper: start a sync client against the configured backend
pub fn start_client(config: &AppConfig) -> Result<SyncHandle, AppError> {
    let api = CrawlerApi::from_config(&config.server)?;
    let connector = Arc::new(WsConnector::new(Duration::from_secs(
        config.server.request_timeout_seconds,
    )));
    SyncClient::start(config, connector, api)
}
