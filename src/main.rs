//! Pickr Monitor: headless job and queue watcher
//!
//! Connects the sync client to the backend event channel and logs every
//! state change until Ctrl-C or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

use pickr_core::config::AppConfig;
use pickr_core::error::AppError;
use pickr_core::events::SyncEvent;
use pickr_realtime::connection::WsConnector;
use pickr_realtime::{CrawlerApi, ObserverRegistry, SyncClient};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Monitor error");
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    match std::env::var("PICKR_CONFIG") {
        Ok(path) => AppConfig::load_from(path),
        Err(_) => {
            let env = std::env::var("PICKR_ENV").unwrap_or_else(|_| "development".to_string());
            AppConfig::load(&env)
        }
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Log one change notification.
fn log_event(event: &SyncEvent) {
    match event {
        SyncEvent::ConnectionChanged { state } => {
            tracing::info!(state = state.as_str(), "Connection changed");
        }
        SyncEvent::JobsReplaced { count } => tracing::info!(jobs = count, "Jobs snapshot"),
        SyncEvent::JobUpdated { job } => tracing::info!(
            job_id = %job.job_id,
            restaurant_id = job.resource_id,
            job_type = %job.job_type,
            status = %job.status,
            current = job.progress.current,
            total = job.progress.total,
            percentage = job.progress.percentage,
            "Job updated"
        ),
        SyncEvent::JobRemoved { job_id } => tracing::info!(job_id = %job_id, "Job removed"),
        SyncEvent::QueueReplaced { count } => tracing::info!(items = count, "Queue snapshot"),
        SyncEvent::QueueUpdated { item } => tracing::info!(
            queue_id = %item.queue_id,
            restaurant_id = item.resource_id,
            status = %item.queue_status,
            position = ?item.position,
            "Queue entry updated"
        ),
        SyncEvent::QueueItemRemoved { queue_id } => {
            tracing::info!(queue_id = %queue_id, "Queue entry removed");
        }
        SyncEvent::SubscriptionAdded { resource_id } => {
            tracing::debug!(restaurant_id = resource_id, "Joined restaurant room");
        }
        SyncEvent::SnapshotFailed { kind, message } => {
            tracing::warn!(snapshot = kind.as_str(), error = %message, "Snapshot failed");
        }
        SyncEvent::CancelRequested { queue_id } => {
            tracing::info!(queue_id = %queue_id, "Cancel requested");
        }
    }
}

/// Main monitor run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = %config.server.base_url,
        "Starting Pickr monitor"
    );

    let observers = Arc::new(ObserverRegistry::new());
    observers.register(Arc::new(log_event));

    let api = CrawlerApi::from_config(&config.server)?;
    let connector = Arc::new(WsConnector::new(Duration::from_secs(
        config.server.request_timeout_seconds,
    )));
    let handle = SyncClient::start_with_observers(&config, connector, api, observers)?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received");

    let metrics = handle.metrics().snapshot();
    handle.shutdown().await;
    tracing::info!(
        frames = metrics.frames_received,
        applied = metrics.events_applied,
        stale = metrics.stale_dropped,
        connects = metrics.connects,
        "Pickr monitor stopped"
    );
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
