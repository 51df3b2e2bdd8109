//! Data models for Tally

mod checkpoint;
mod command;
mod record;
mod user;

pub use checkpoint::{Checkpoint, CheckpointId, ResourceType, TouchedSet};
pub use command::{Command, CommandError, CommandStatus, CommandType, CommandUuid, OkMarker};
pub use record::{
    FieldErrors, NewRecord, Record, RecordFilter, RecordId, RecordPatch, NAME_REQUIRED,
};
pub use user::UserProfile;
