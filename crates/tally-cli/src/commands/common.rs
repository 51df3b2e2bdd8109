use std::io::{self, IsTerminal, Read};
use std::path::Path;

use serde::Serialize;
use tally_core::{Checkpoint, Command};

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct CheckpointItem {
    pub id: String,
    pub full_sync: bool,
    pub touched: usize,
    pub created_at: i64,
    pub created_at_iso: String,
}

/// Read a JSON command array from `path`, or from piped stdin when no path
/// is given
pub fn read_commands(path: Option<&Path>) -> Result<Vec<Command>, CliError> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)?,
        None => read_stdin()?.ok_or_else(|| {
            CliError::InvalidInput("Pipe a JSON command array on stdin or pass --file".to_string())
        })?,
    };
    parse_commands(&raw)
}

pub fn parse_commands(raw: &str) -> Result<Vec<Command>, CliError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed)
        .map_err(|error| CliError::InvalidInput(format!("Invalid command array: {error}")))
}

fn read_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(Some(buffer))
}

pub fn print_json(value: &impl Serialize) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn checkpoint_to_item(checkpoint: &Checkpoint) -> CheckpointItem {
    CheckpointItem {
        id: checkpoint.id.to_string(),
        full_sync: checkpoint.full_sync,
        touched: checkpoint.touched.len(),
        created_at: checkpoint.created_at,
        created_at_iso: format_timestamp(checkpoint.created_at),
    }
}

pub fn format_checkpoint_lines(checkpoints: &[Checkpoint]) -> Vec<String> {
    checkpoints
        .iter()
        .map(|checkpoint| {
            let kind = if checkpoint.full_sync {
                "bootstrap"
            } else {
                "batch"
            };
            format!(
                "{}  {}  {:<9}  {} touched",
                checkpoint.id,
                format_timestamp(checkpoint.created_at),
                kind,
                checkpoint.touched.len()
            )
        })
        .collect()
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string(),
    )
}
