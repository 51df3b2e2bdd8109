//! Database layer for Tally

mod connection;
mod ledger_repository;
mod migrations;
mod record_repository;
mod user_repository;

pub use connection::Database;
pub use ledger_repository::{LibSqlSyncLedger, SyncLedger};
pub use record_repository::{LibSqlRecordRepository, RecordRepository};
pub use user_repository::{LibSqlUserRepository, UserRepository};
