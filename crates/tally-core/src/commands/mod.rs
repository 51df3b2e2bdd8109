//! Command processing: applying one client mutation against the record store
//!
//! Handlers only touch records. They never mint checkpoints; the sync
//! service accumulates their outcomes and writes one checkpoint per batch.

mod business;

use async_trait::async_trait;
use libsql::Connection;
use serde_json::Value;

use crate::error::Result;
use crate::models::{CommandError, CommandType, RecordId, ResourceType};

pub use business::{BusinessCommandHandler, ADD_FAILED, UPDATE_FAILED};

/// Message reported for a command whose `type` is not supported
pub const UNSUPPORTED_COMMAND: &str = "unsupported command type";

/// Result of applying a single command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command changed `id` of `resource`
    Applied { resource: ResourceType, id: RecordId },
    /// The command was rejected; reported back in `sync_status`
    Rejected(CommandError),
}

impl CommandOutcome {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(CommandError::new(message))
    }

    /// Touched record id, when the command succeeded
    pub const fn applied_id(&self) -> Option<RecordId> {
        match self {
            Self::Applied { id, .. } => Some(*id),
            Self::Rejected(_) => None,
        }
    }
}

/// Applies commands for one resource type.
///
/// `Err` is reserved for store failures, which abort the whole batch.
/// Validation and lookup failures are `CommandOutcome::Rejected`.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Resource type whose commands this handler applies
    fn resource_type(&self) -> ResourceType;

    /// Apply a command of kind `kind` with payload `args` on behalf of `owner_id`
    async fn apply(
        &self,
        conn: &Connection,
        owner_id: &str,
        kind: CommandType,
        args: &Value,
    ) -> Result<CommandOutcome>;
}
