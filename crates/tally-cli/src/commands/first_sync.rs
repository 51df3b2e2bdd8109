use std::path::Path;

use tally_core::sync::{FirstSyncRequest, SyncType};

use crate::cli::FirstSyncMode;
use crate::client::ApiClient;
use crate::commands::common::{print_json, read_commands};
use crate::error::CliError;

pub async fn run_first_sync(
    client: &ApiClient,
    mode: FirstSyncMode,
    file: Option<&Path>,
) -> Result<(), CliError> {
    let commands = match file {
        Some(path) => read_commands(Some(path))?,
        None => Vec::new(),
    };
    let request = FirstSyncRequest {
        sync_type: sync_type_for(mode),
        commands,
    };

    let snapshot = client.first_sync(&request).await?;
    print_json(&snapshot)
}

pub const fn sync_type_for(mode: FirstSyncMode) -> SyncType {
    match mode {
        FirstSyncMode::KeepDevice => SyncType::KeepDevice,
        FirstSyncMode::KeepServer => SyncType::KeepServer,
    }
}
