//! Cancel a queue entry through the REST API.

use clap::Args;

use crate::output;
use pickr_core::error::AppError;
use pickr_core::types::QueueId;
use pickr_realtime::CrawlerApi;

/// Arguments for the cancel command
#[derive(Debug, Args)]
pub struct CancelArgs {
    /// Queue entry ID
    pub queue_id: String,
    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,
}

/// Execute the cancel command
pub async fn execute(args: &CancelArgs, config_path: &str) -> Result<(), AppError> {
    let queue_id = QueueId::new(args.queue_id.trim());
    if queue_id.as_str().is_empty() {
        return Err(AppError::validation("Queue ID must not be empty"));
    }

    if !args.yes {
        let confirm = dialoguer::Confirm::new()
            .with_prompt(format!("Cancel queue entry '{}'?", queue_id))
            .default(false)
            .interact()
            .map_err(|e| AppError::internal(format!("Input error: {}", e)))?;

        if !confirm {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let config = super::load_config(config_path)?;
    let api = CrawlerApi::from_config(&config.server)?;
    api.cancel_queue_item(&queue_id).await?;

    output::print_success(&format!("Cancel requested for queue entry {}", queue_id));
    Ok(())
}
