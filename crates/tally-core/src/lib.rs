//! tally-core - Core library for Tally
//!
//! This crate contains the record store, the checkpoint ledger, command
//! replay and the sync orchestration used by the API server and the CLI.

pub mod commands;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Checkpoint, CheckpointId, Command, Record, RecordId, ResourceType};
pub use services::SyncService;
