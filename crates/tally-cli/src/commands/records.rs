use std::path::Path;

use serde_json::{Map, Value};
use tally_core::models::CommandType;
use tally_core::Command;

use crate::client::ApiClient;
use crate::commands::common::{print_json, read_commands};
use crate::error::CliError;

/// Optional record attributes given on the command line
#[derive(Debug, Default, Clone)]
pub struct RecordFields {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub currency: Option<String>,
    pub order: Option<i64>,
    pub archived: Option<bool>,
    pub favorite: Option<bool>,
}

impl RecordFields {
    fn into_args(self) -> Map<String, Value> {
        let mut args = Map::new();
        let text = [
            ("name", self.name),
            ("icon", self.icon),
            ("color", self.color),
            ("currency", self.currency),
        ];
        for (key, value) in text {
            if let Some(value) = value {
                args.insert(key.to_string(), Value::String(value));
            }
        }
        if let Some(order) = self.order {
            args.insert("order".to_string(), Value::from(order));
        }
        if let Some(archived) = self.archived {
            args.insert("is_archived".to_string(), Value::Bool(archived));
        }
        if let Some(favorite) = self.favorite {
            args.insert("is_favorite".to_string(), Value::Bool(favorite));
        }
        args
    }
}

pub fn add_command(fields: RecordFields, temp_id: Option<String>) -> Command {
    let command = Command::new(CommandType::RecordAdd, Value::Object(fields.into_args()));
    match temp_id {
        Some(temp_id) => command.with_temp_id(temp_id),
        None => command,
    }
}

pub fn update_command(id: &str, fields: RecordFields) -> Result<Command, CliError> {
    let mut args = fields.into_args();
    if args.is_empty() {
        return Err(CliError::InvalidInput(
            "Nothing to update; pass at least one attribute".to_string(),
        ));
    }
    args.insert("id".to_string(), Value::String(normalize_record_id(id)?));
    Ok(Command::new(CommandType::RecordUpdate, Value::Object(args)))
}

pub fn delete_command(id: &str) -> Result<Command, CliError> {
    let mut args = Map::new();
    args.insert("id".to_string(), Value::String(normalize_record_id(id)?));
    Ok(Command::new(CommandType::RecordDelete, Value::Object(args)))
}

fn normalize_record_id(id: &str) -> Result<String, CliError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(CliError::InvalidInput("Record id cannot be empty".to_string()));
    }
    Ok(id.to_string())
}

pub async fn run_commands(client: &ApiClient, commands: Vec<Command>) -> Result<(), CliError> {
    let count = commands.len();
    let response = client.push(commands).await?;
    tracing::debug!(
        commands = count,
        sync_token = %response.sync_token,
        "Pushed command batch"
    );
    print_json(&response)
}

pub async fn run_push(client: &ApiClient, file: Option<&Path>) -> Result<(), CliError> {
    let commands = read_commands(file)?;
    run_commands(client, commands).await
}
