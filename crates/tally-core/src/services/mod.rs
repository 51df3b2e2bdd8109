//! Services shared by the API server and CLI

mod sync;

pub use sync::SyncService;
