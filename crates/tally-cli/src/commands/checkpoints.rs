use std::path::Path;

use tally_core::SyncService;

use crate::commands::common::{checkpoint_to_item, format_checkpoint_lines, CheckpointItem};
use crate::error::CliError;

pub async fn run_checkpoints(
    db_path: &Path,
    user: &str,
    limit: usize,
    as_json: bool,
) -> Result<(), CliError> {
    let user = user.trim();
    if user.is_empty() {
        return Err(CliError::InvalidInput("User id cannot be empty".to_string()));
    }
    if !db_path.exists() {
        return Err(CliError::Config(format!(
            "Database file not found: {}",
            db_path.display()
        )));
    }

    let service = SyncService::open_path(db_path).await?;
    let checkpoints = service.history(user, limit).await?;

    if as_json {
        let items = checkpoints
            .iter()
            .map(checkpoint_to_item)
            .collect::<Vec<CheckpointItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if checkpoints.is_empty() {
        println!("No checkpoints recorded.");
        return Ok(());
    }

    for line in format_checkpoint_lines(&checkpoints) {
        println!("{line}");
    }
    Ok(())
}
