//! One-shot status report.

use std::time::Duration;

use clap::Args;

use crate::output::{self, OutputFormat};
use pickr_core::config::AppConfig;
use pickr_core::error::AppError;
use pickr_core::types::{ConnectionState, ResourceId};

/// Arguments for the status command
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Also join the rooms of these restaurants
    #[arg(short, long = "resource")]
    pub resources: Vec<ResourceId>,
}

/// Execute the status command
pub async fn execute(
    args: &StatusArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let handle = super::start_client(&config)?;
    for resource_id in &args.resources {
        handle.ensure_subscribed(*resource_id).await?;
    }

    let mut views = handle.watch_view();
    let settled = tokio::time::timeout(wait_limit(&config), async {
        loop {
            let done = {
                let view = views.borrow_and_update();
                (view.connection.is_connected() && !view.loading)
                    || view.connection == ConnectionState::Failed
            };
            if done || views.changed().await.is_err() {
                break;
            }
        }
    })
    .await;
    if settled.is_err() {
        output::print_warning("Timed out waiting for snapshots, state may be incomplete");
    }

    output::print_view(&handle.view(), handle.metrics().snapshot(), format);
    handle.shutdown().await;
    Ok(())
}

/// Upper bound for connecting (with retries) and receiving both snapshots.
fn wait_limit(config: &AppConfig) -> Duration {
    let realtime = &config.realtime;
    let tries = realtime.reconnect_attempts.saturating_add(1);
    let per_try = realtime.reconnect_delay() + Duration::from_secs(config.server.request_timeout_seconds);
    per_try * tries + realtime.snapshot_timeout()
}
