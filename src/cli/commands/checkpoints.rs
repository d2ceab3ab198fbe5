//! Checkpoints command implementation.

use crate::checkpoint;
use crate::cli::{CheckpointAction, Output};
use crate::config::Settings;
use anyhow::Result;

/// Run the checkpoints command.
pub async fn run_checkpoints(action: &CheckpointAction, settings: Settings) -> Result<()> {
    let store = checkpoint::open_store(&settings)?;

    match action {
        CheckpointAction::List => {
            let summaries = store.list().await?;
            if summaries.is_empty() {
                Output::info("No checkpoints stored.");
                return Ok(());
            }
            Output::header(&format!("Checkpoints ({})", summaries.len()));
            for summary in &summaries {
                Output::checkpoint_line(summary);
            }
        }

        CheckpointAction::Show { episode_id } => match store.load(episode_id).await? {
            Some(checkpoint) => {
                println!("{}", serde_json::to_string_pretty(&checkpoint)?);
            }
            None => Output::warning(&format!("No checkpoint for {}", episode_id)),
        },

        CheckpointAction::Clear { episode_id } => {
            if store.delete(episode_id).await? {
                Output::success(&format!("Removed checkpoint for {}", episode_id));
            } else {
                Output::warning(&format!("No checkpoint for {}", episode_id));
            }
        }
    }

    Ok(())
}
