//! Live view of jobs and queue.

use clap::Args;

use crate::output::{self, OutputFormat};
use pickr_core::error::AppError;
use pickr_core::types::ResourceId;

/// Arguments for the watch command
#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Also join the rooms of these restaurants
    #[arg(short, long = "resource")]
    pub resources: Vec<ResourceId>,
}

/// Execute the watch command
pub async fn execute(
    args: &WatchArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let handle = super::start_client(&config)?;
    for resource_id in &args.resources {
        handle.ensure_subscribed(*resource_id).await?;
    }

    let mut views = handle.watch_view();
    loop {
        let view = views.borrow_and_update().clone();
        if format == OutputFormat::Table {
            output::clear_screen();
        }
        output::print_view(&view, handle.metrics().snapshot(), format);

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
