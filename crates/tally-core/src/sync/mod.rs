//! Sync protocol: wire envelopes and the per-batch accumulator

mod batch;
mod protocol;

pub use batch::Batch;
pub use protocol::{
    CommandsResponse, FirstSyncRequest, PullResponse, ResourceSelection, SnapshotResponse,
    SyncData, SyncRequest, SyncType, FULL_SYNC_TOKEN,
};
