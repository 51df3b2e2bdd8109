//! Command handler for business records

use async_trait::async_trait;
use libsql::Connection;
use serde_json::Value;

use super::{CommandHandler, CommandOutcome};
use crate::db::{LibSqlRecordRepository, RecordRepository};
use crate::error::{Error, Result};
use crate::models::{
    CommandError, CommandType, FieldErrors, RecordId, RecordPatch, ResourceType,
};

/// Message reported when a `record_add` fails validation
pub const ADD_FAILED: &str = "It's not possible to create the business";

/// Message reported when a `record_update` fails validation
pub const UPDATE_FAILED: &str = "It's not possible to update the business";

/// Argument keys that would reassign a record's owner
const OWNER_KEYS: [&str; 2] = ["owner_id", "userId"];

/// Applies `record_*` commands to the `businesses` collection
#[derive(Debug, Default, Clone, Copy)]
pub struct BusinessCommandHandler;

impl BusinessCommandHandler {
    async fn add(conn: &Connection, owner_id: &str, args: &Value) -> Result<CommandOutcome> {
        let attrs = match parse_patch(args).and_then(RecordPatch::into_new_record) {
            Ok(attrs) => attrs,
            Err(errors) => {
                return Ok(CommandOutcome::Rejected(CommandError::with_errors(
                    ADD_FAILED, errors,
                )));
            }
        };

        let record = LibSqlRecordRepository::new(conn)
            .create(owner_id, attrs)
            .await?;
        tracing::debug!(record = %record.id, "Created record");

        Ok(applied(record.id))
    }

    async fn delete(conn: &Connection, owner_id: &str, args: &Value) -> Result<CommandOutcome> {
        let (raw, id) = match target(args) {
            Ok(target) => target,
            Err(outcome) => return Ok(outcome),
        };

        match LibSqlRecordRepository::new(conn)
            .soft_delete(owner_id, &id)
            .await
        {
            Ok(record) => {
                tracing::debug!(record = %record.id, "Soft-deleted record");
                Ok(applied(record.id))
            }
            Err(Error::NotFound(_)) => Ok(not_found(&raw)),
            Err(err) => Err(err),
        }
    }

    async fn update(conn: &Connection, owner_id: &str, args: &Value) -> Result<CommandOutcome> {
        if let Some(key) = OWNER_KEYS.iter().find(|key| args.get(**key).is_some()) {
            let errors = FieldErrors::from([(
                (*key).to_string(),
                vec!["The owner of a business cannot be changed".to_string()],
            )]);
            return Ok(CommandOutcome::Rejected(CommandError::with_errors(
                UPDATE_FAILED,
                errors,
            )));
        }

        let (raw, id) = match target(args) {
            Ok(target) => target,
            Err(outcome) => return Ok(outcome),
        };

        let patch = match parse_patch(args).and_then(|patch| patch.validate().map(|()| patch)) {
            Ok(patch) => patch,
            Err(errors) => {
                return Ok(CommandOutcome::Rejected(CommandError::with_errors(
                    UPDATE_FAILED,
                    errors,
                )));
            }
        };

        match LibSqlRecordRepository::new(conn)
            .update(owner_id, &id, &patch)
            .await
        {
            Ok(record) => {
                tracing::debug!(record = %record.id, "Updated record");
                Ok(applied(record.id))
            }
            Err(Error::NotFound(_)) => Ok(not_found(&raw)),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl CommandHandler for BusinessCommandHandler {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Businesses
    }

    async fn apply(
        &self,
        conn: &Connection,
        owner_id: &str,
        kind: CommandType,
        args: &Value,
    ) -> Result<CommandOutcome> {
        match kind {
            CommandType::RecordAdd => Self::add(conn, owner_id, args).await,
            CommandType::RecordDelete => Self::delete(conn, owner_id, args).await,
            CommandType::RecordUpdate => Self::update(conn, owner_id, args).await,
        }
    }
}

const fn applied(id: RecordId) -> CommandOutcome {
    CommandOutcome::Applied {
        resource: ResourceType::Businesses,
        id,
    }
}

fn not_found(raw: &str) -> CommandOutcome {
    CommandOutcome::rejected(format!("{raw} not found"))
}

/// Read `args.id`; anything that is not a record id cannot exist
fn target(args: &Value) -> std::result::Result<(String, RecordId), CommandOutcome> {
    let raw = match args.get("id") {
        Some(Value::String(raw)) => raw.clone(),
        Some(Value::Null) | None => return Err(CommandOutcome::rejected("id is required")),
        Some(other) => other.to_string(),
    };

    match raw.trim().parse() {
        Ok(id) => Ok((raw, id)),
        Err(_) => Err(not_found(&raw)),
    }
}

fn parse_patch(args: &Value) -> std::result::Result<RecordPatch, FieldErrors> {
    if args.is_null() {
        return Ok(RecordPatch::default());
    }

    serde_json::from_value(args.clone())
        .map_err(|err| FieldErrors::from([("args".to_string(), vec![err.to_string()])]))
}
