//! Per-request accumulator for a command batch

use std::collections::BTreeMap;

use serde_json::Value;

use crate::commands::CommandOutcome;
use crate::models::{Command, CommandStatus, CommandType, CommandUuid, RecordId, TouchedSet};

/// State gathered while replaying one batch of commands
#[derive(Debug, Default)]
pub struct Batch {
    touched: TouchedSet,
    sync_status: BTreeMap<CommandUuid, CommandStatus>,
    temp_id_mapping: BTreeMap<String, RecordId>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arguments of `command` with an `args.id` that names a temp id created
    /// earlier in this batch replaced by the server id
    pub fn resolve_args(&self, command: &Command) -> Value {
        let mut args = command.args.clone();
        let resolved = command
            .target_id()
            .and_then(|target| self.temp_id_mapping.get(target));
        if let (Some(id), Some(object)) = (resolved, args.as_object_mut()) {
            object.insert("id".to_string(), Value::String(id.as_str()));
        }
        args
    }

    /// Fold a command's outcome into the batch
    pub fn record(&mut self, command: &Command, kind: Option<CommandType>, outcome: CommandOutcome) {
        let status = match outcome {
            CommandOutcome::Applied { resource, id } => {
                self.touched.insert(resource, id);
                if let (Some(CommandType::RecordAdd), Some(temp_id)) = (kind, &command.temp_id) {
                    self.temp_id_mapping.insert(temp_id.clone(), id);
                }
                CommandStatus::ok()
            }
            CommandOutcome::Rejected(error) => CommandStatus::Failed { error },
        };
        self.sync_status.insert(command.uuid.clone(), status);
    }

    /// Record ids touched by successful commands
    pub const fn touched(&self) -> &TouchedSet {
        &self.touched
    }

    /// Number of commands that succeeded
    pub fn applied(&self) -> usize {
        self.sync_status.values().filter(|status| status.is_ok()).count()
    }

    /// Consume the batch into its `(sync_status, temp_id_mapping)` maps
    pub fn finish(self) -> (BTreeMap<CommandUuid, CommandStatus>, BTreeMap<String, RecordId>) {
        (self.sync_status, self.temp_id_mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CommandError, ResourceType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn applied(id: RecordId) -> CommandOutcome {
        CommandOutcome::Applied {
            resource: ResourceType::Businesses,
            id,
        }
    }

    #[test]
    fn test_mapping_only_for_successful_adds() {
        let mut batch = Batch::new();
        let created = RecordId::new();
        let updated = RecordId::new();

        let add = Command::new(CommandType::RecordAdd, json!({ "name": "a" })).with_temp_id("t1");
        batch.record(&add, add.command_type(), applied(created));

        let update = Command::new(CommandType::RecordUpdate, json!({ "id": updated.as_str() }))
            .with_temp_id("t2");
        batch.record(&update, update.command_type(), applied(updated));

        let failed = Command::new(CommandType::RecordAdd, json!({})).with_temp_id("t3");
        batch.record(
            &failed,
            failed.command_type(),
            CommandOutcome::Rejected(CommandError::new("nope")),
        );

        assert_eq!(batch.applied(), 2);
        assert_eq!(batch.touched().len(), 2);

        let (status, mapping) = batch.finish();
        assert_eq!(status.len(), 3);
        assert_eq!(mapping, BTreeMap::from([("t1".to_string(), created)]));
    }

    #[test]
    fn test_resolve_args_rewrites_temp_id() {
        let mut batch = Batch::new();
        let created = RecordId::new();
        let add = Command::new(CommandType::RecordAdd, json!({ "name": "a" })).with_temp_id("t1");
        batch.record(&add, add.command_type(), applied(created));

        let update = Command::new(CommandType::RecordUpdate, json!({ "id": "t1", "name": "b" }));
        assert_eq!(
            batch.resolve_args(&update),
            json!({ "id": created.as_str(), "name": "b" })
        );

        let other = Command::new(CommandType::RecordDelete, json!({ "id": "t9" }));
        assert_eq!(batch.resolve_args(&other), json!({ "id": "t9" }));
    }
}
