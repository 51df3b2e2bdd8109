//! Request and response envelopes exchanged with sync clients

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::models::{
    CheckpointId, Command, CommandStatus, CommandUuid, Record, RecordId, ResourceType, UserProfile,
};

/// Token value that requests a full snapshot instead of a diff.
///
/// Sync tokens are compared with surrounding whitespace removed, so `" * "`
/// also asks for a snapshot and a padded checkpoint id still resolves.
pub const FULL_SYNC_TOKEN: &str = "*";

/// Body of `POST /v1/sync`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<Command>>,
    /// `*` or a checkpoint id; surrounding whitespace is ignored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_types: Option<ResourceSelection>,
}

/// Resource types requested by a pull: a single label or a list of labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceSelection {
    One(String),
    Many(Vec<String>),
}

impl ResourceSelection {
    /// Resolve labels to resource types.
    ///
    /// `"all"`, `"*"` or an empty list select everything; unknown labels
    /// are ignored.
    pub fn resolve(selection: Option<&Self>) -> BTreeSet<ResourceType> {
        let labels: Vec<&str> = match selection {
            None => Vec::new(),
            Some(Self::One(label)) => vec![label.as_str()],
            Some(Self::Many(labels)) => labels.iter().map(String::as_str).collect(),
        };

        let everything = labels.is_empty()
            || labels
                .iter()
                .any(|label| matches!(label.trim(), "all" | FULL_SYNC_TOKEN));
        if everything {
            return ResourceType::ALL.into_iter().collect();
        }

        labels
            .iter()
            .filter_map(|label| label.parse().ok())
            .collect()
    }
}

/// How a device joins an account on its first sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncType {
    /// The device's data wins: server records are purged before its commands run
    KeepDevice,
    /// Server data is kept and the device's commands are applied on top
    #[serde(other)]
    KeepServer,
}

/// Body of `POST /v1/sync/first`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirstSyncRequest {
    pub sync_type: SyncType,
    #[serde(default)]
    pub commands: Vec<Command>,
}

/// Response to a command batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandsResponse {
    /// Checkpoint minted for the batch
    pub sync_token: CheckpointId,
    /// Outcome per command `uuid`, keyed by the text the client sent
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sync_status: BTreeMap<CommandUuid, CommandStatus>,
    /// Server id per client temp id, for successful creates
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub temp_id_mapping: BTreeMap<String, RecordId>,
}

/// Full snapshot returned for the `*` token and after a first sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub sync_token: CheckpointId,
    pub full_sync: bool,
    pub user: UserProfile,
    pub businesses: Vec<Record>,
}

/// Records changed since a checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResponse {
    pub user: UserProfile,
    pub businesses: Vec<Record>,
}

/// Either envelope a pull can produce
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SyncData {
    Snapshot(SnapshotResponse),
    Changes(PullResponse),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_resource_selection_defaults_to_everything() {
        let all: BTreeSet<ResourceType> = ResourceType::ALL.into_iter().collect();

        assert_eq!(ResourceSelection::resolve(None), all);
        assert_eq!(
            ResourceSelection::resolve(Some(&ResourceSelection::Many(Vec::new()))),
            all
        );
        assert_eq!(
            ResourceSelection::resolve(Some(&ResourceSelection::One("all".into()))),
            all
        );
    }

    #[test]
    fn test_resource_selection_ignores_unknown_labels() {
        let selection: ResourceSelection =
            serde_json::from_value(json!(["invoices", "businesses"])).unwrap();
        assert_eq!(
            ResourceSelection::resolve(Some(&selection)),
            BTreeSet::from([ResourceType::Businesses])
        );

        let selection = ResourceSelection::One("invoices".into());
        assert!(ResourceSelection::resolve(Some(&selection)).is_empty());
    }

    #[test]
    fn test_first_sync_request_parses_sync_type() {
        let request: FirstSyncRequest =
            serde_json::from_value(json!({ "sync_type": "keep-device" })).unwrap();
        assert_eq!(request.sync_type, SyncType::KeepDevice);
        assert!(request.commands.is_empty());

        let request: FirstSyncRequest =
            serde_json::from_value(json!({ "sync_type": "merge", "commands": [] })).unwrap();
        assert_eq!(request.sync_type, SyncType::KeepServer);
    }

    #[test]
    fn test_commands_response_omits_empty_maps() {
        let token = CheckpointId::new();
        let response = CommandsResponse {
            sync_token: token,
            sync_status: BTreeMap::new(),
            temp_id_mapping: BTreeMap::new(),
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "sync_token": token.as_str() })
        );
    }
}
