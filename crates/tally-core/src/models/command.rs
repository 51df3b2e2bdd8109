//! Client mutation commands and their per-command status

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::checkpoint::ResourceType;
use super::record::FieldErrors;

/// A mutation intent submitted by a client.
///
/// `kind` stays a plain string on the wire so one unknown command type is
/// reported in its own status instead of failing the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Command type label, e.g. `record_add`
    #[serde(rename = "type")]
    pub kind: String,
    /// Client-local correlation id for records created by this command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
    /// Idempotency/correlation token, echoed as the `sync_status` key
    pub uuid: CommandUuid,
    /// Payload, shape depends on `kind`
    #[serde(default)]
    pub args: Value,
}

impl Command {
    /// Build a command with a fresh correlation uuid
    pub fn new(kind: CommandType, args: Value) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            temp_id: None,
            uuid: CommandUuid::new(),
            args,
        }
    }

    /// Attach a client temp id
    #[must_use]
    pub fn with_temp_id(mut self, temp_id: impl Into<String>) -> Self {
        self.temp_id = Some(temp_id.into());
        self
    }

    /// The typed command kind, if the label is supported
    pub fn command_type(&self) -> Option<CommandType> {
        CommandType::parse(&self.kind)
    }

    /// The `args.id` reference used by delete/update commands
    pub fn target_id(&self) -> Option<&str> {
        self.args.get("id").and_then(Value::as_str)
    }
}

/// A command's client-chosen uuid.
///
/// Must parse as a UUID in any accepted notation, but the text is kept as
/// sent so the `sync_status` key matches what the client holds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommandUuid(String);

impl CommandUuid {
    /// Generate a fresh random uuid
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CommandUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<String> for CommandUuid {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Uuid::parse_str(&raw).map_err(|error| format!("invalid command uuid `{raw}`: {error}"))?;
        Ok(Self(raw))
    }
}

impl From<CommandUuid> for String {
    fn from(uuid: CommandUuid) -> Self {
        uuid.0
    }
}

impl fmt::Display for CommandUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The closed set of supported command kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    /// Create a record
    RecordAdd,
    /// Soft-delete a record
    RecordDelete,
    /// Patch a record's attributes
    RecordUpdate,
}

impl CommandType {
    /// Parse a wire label. The `business_*` labels are accepted as aliases.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "record_add" | "business_add" => Some(Self::RecordAdd),
            "record_delete" | "business_delete" => Some(Self::RecordDelete),
            "record_update" | "business_update" => Some(Self::RecordUpdate),
            _ => None,
        }
    }

    /// Canonical wire label
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RecordAdd => "record_add",
            Self::RecordDelete => "record_delete",
            Self::RecordUpdate => "record_update",
        }
    }

    /// Resource type whose handler applies this command
    pub const fn resource_type(self) -> ResourceType {
        match self {
            Self::RecordAdd | Self::RecordDelete | Self::RecordUpdate => ResourceType::Businesses,
        }
    }
}

/// Structured failure reported for a single command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errors: None,
        }
    }

    pub fn with_errors(message: impl Into<String>, errors: FieldErrors) -> Self {
        Self {
            message: message.into(),
            errors: Some(errors),
        }
    }
}

/// Marker serialized as the bare string `"ok"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OkMarker {
    Ok,
}

/// Per-command entry of `sync_status`: `"ok"` or `{"error": {...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandStatus {
    Ok(OkMarker),
    Failed { error: CommandError },
}

impl CommandStatus {
    pub const fn ok() -> Self {
        Self::Ok(OkMarker::Ok)
    }

    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_labels_and_aliases() {
        assert_eq!(CommandType::parse("record_add"), Some(CommandType::RecordAdd));
        assert_eq!(
            CommandType::parse("business_update"),
            Some(CommandType::RecordUpdate)
        );
        assert_eq!(CommandType::parse("record_merge"), None);
    }

    #[test]
    fn test_command_deserializes_wire_shape() {
        let command: Command = serde_json::from_value(json!({
            "type": "record_add",
            "temp_id": "t1",
            "uuid": "0b9f8f8c-7c2e-4b7e-9a43-3c8c3b1c2f10",
            "args": { "name": "Groceries" }
        }))
        .unwrap();

        assert_eq!(command.command_type(), Some(CommandType::RecordAdd));
        assert_eq!(command.temp_id.as_deref(), Some("t1"));
        assert_eq!(command.args["name"], "Groceries");
    }

    #[test]
    fn test_command_rejects_invalid_uuid() {
        let result = serde_json::from_value::<Command>(json!({
            "type": "record_add",
            "uuid": "not-a-uuid",
            "args": {}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_command_uuid_kept_as_sent() {
        for sent in [
            "0B9F8F8C7C2E4B7E9A433C8C3B1C2F10",
            "{0b9f8f8c-7c2e-4b7e-9a43-3c8c3b1c2f10}",
            "urn:uuid:0b9f8f8c-7c2e-4b7e-9a43-3c8c3b1c2f10",
        ] {
            let command: Command = serde_json::from_value(json!({
                "type": "record_add",
                "uuid": sent,
            }))
            .unwrap();
            assert_eq!(command.uuid.as_str(), sent);
            assert_eq!(serde_json::to_value(&command).unwrap()["uuid"], sent);
        }
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_value(CommandStatus::ok()).unwrap(), json!("ok"));

        let failed = CommandStatus::Failed {
            error: CommandError::new("nonexistent not found"),
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({ "error": { "message": "nonexistent not found" } })
        );

        let parsed: CommandStatus =
            serde_json::from_value(json!({ "error": { "message": "x" } })).unwrap();
        assert!(!parsed.is_ok());
        assert!(serde_json::from_value::<CommandStatus>(json!("ok"))
            .unwrap()
            .is_ok());
    }
}
