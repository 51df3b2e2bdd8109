pub mod checkpoints;
pub mod common;
pub mod first_sync;
pub mod health;
pub mod pull;
pub mod records;
