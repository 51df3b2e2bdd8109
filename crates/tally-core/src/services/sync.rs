//! Sync orchestration shared by the HTTP API and offline tools.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use libsql::{Connection, Transaction, TransactionBehavior};
use tokio::sync::Mutex;

use crate::commands::{BusinessCommandHandler, CommandHandler, CommandOutcome, UNSUPPORTED_COMMAND};
use crate::db::{
    Database, LibSqlRecordRepository, LibSqlSyncLedger, LibSqlUserRepository, RecordRepository,
    SyncLedger, UserRepository,
};
use crate::models::{Checkpoint, Command, RecordFilter, ResourceType, TouchedSet, UserProfile};
use crate::sync::{
    Batch, CommandsResponse, FirstSyncRequest, PullResponse, ResourceSelection, SnapshotResponse,
    SyncData, SyncType, FULL_SYNC_TOKEN,
};
use crate::util::user_fingerprint;
use crate::{Error, Result};

/// Thread-safe service driving command replay and checkpoint pulls.
#[derive(Clone)]
pub struct SyncService {
    db: Arc<Mutex<Database>>,
    handlers: Arc<HashMap<ResourceType, Arc<dyn CommandHandler>>>,
}

impl SyncService {
    /// Wrap an open database with the default handler set.
    pub fn new(db: Database) -> Self {
        Self::with_handlers(db, [Arc::new(BusinessCommandHandler) as Arc<dyn CommandHandler>])
    }

    /// Wrap an open database with an explicit handler set, keyed by the
    /// resource type each handler reports.
    pub fn with_handlers(
        db: Database,
        handlers: impl IntoIterator<Item = Arc<dyn CommandHandler>>,
    ) -> Self {
        let handlers = handlers
            .into_iter()
            .map(|handler| (handler.resource_type(), handler))
            .collect();
        Self {
            db: Arc::new(Mutex::new(db)),
            handlers: Arc::new(handlers),
        }
    }

    /// Open a service backed by the database file at `db_path`.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!("Opening sync database at {}", db_path.display());
        Ok(Self::new(Database::open(&db_path).await?))
    }

    /// Open an in-memory service (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory().await?))
    }

    /// Check that the store answers queries.
    pub async fn ping(&self) -> Result<()> {
        let db = self.db.lock().await;
        let mut rows = db.connection().query("SELECT 1", ()).await?;
        rows.next().await?;
        Ok(())
    }

    /// Register or refresh the profile of an authenticated user.
    pub async fn ensure_user(&self, user_id: &str, email: Option<&str>) -> Result<UserProfile> {
        let db = self.db.lock().await;
        LibSqlUserRepository::new(db.connection())
            .upsert(user_id, email)
            .await
    }

    /// Replay `commands` in order and mint one checkpoint for the batch.
    ///
    /// The batch and its checkpoint commit together. Command failures are
    /// reported in `sync_status`; store failures roll everything back, and
    /// so does dropping the returned future before it completes.
    pub async fn run_commands(
        &self,
        owner_id: &str,
        commands: &[Command],
    ) -> Result<CommandsResponse> {
        let db = self.db.lock().await;

        let tx = begin(db.connection()).await?;
        let result = self.apply_batch(&tx, owner_id, commands).await;
        finish(tx, result).await
    }

    /// Resolve a pull: `*` yields a full snapshot, any other token the
    /// records touched since that checkpoint.
    pub async fn sync_data(
        &self,
        owner_id: &str,
        sync_token: &str,
        resource_types: Option<&ResourceSelection>,
    ) -> Result<SyncData> {
        if sync_token.trim() == FULL_SYNC_TOKEN {
            return self.snapshot(owner_id).await.map(SyncData::Snapshot);
        }

        let db = self.db.lock().await;
        let conn = db.connection();
        let user = load_user(conn, owner_id).await?;
        let checkpoints = LibSqlSyncLedger::new(conn)
            .checkpoints_since(owner_id, sync_token)
            .await?;

        let selected = ResourceSelection::resolve(resource_types);
        let mut touched = TouchedSet::new();
        for checkpoint in &checkpoints {
            touched.merge(&checkpoint.touched);
        }
        let ids: Vec<_> = if selected.contains(&ResourceType::Businesses) {
            touched.ids(ResourceType::Businesses).collect()
        } else {
            Vec::new()
        };

        let businesses = LibSqlRecordRepository::new(conn).list_by_ids(&ids).await?;
        tracing::debug!(
            owner = user_fingerprint(owner_id),
            checkpoints = checkpoints.len(),
            businesses = businesses.len(),
            "Resolved incremental pull"
        );

        Ok(SyncData::Changes(PullResponse { user, businesses }))
    }

    /// Full snapshot of the owner's live data at the latest checkpoint,
    /// bootstrapping the chain when it is empty.
    pub async fn snapshot(&self, owner_id: &str) -> Result<SnapshotResponse> {
        let db = self.db.lock().await;
        let conn = db.connection();

        let user = load_user(conn, owner_id).await?;
        let checkpoint = LibSqlSyncLedger::new(conn)
            .latest_or_bootstrap(owner_id)
            .await?;
        let businesses = LibSqlRecordRepository::new(conn)
            .list_by_owner(owner_id, RecordFilter::live())
            .await?;

        Ok(SnapshotResponse {
            sync_token: checkpoint.id,
            full_sync: checkpoint.full_sync,
            user,
            businesses,
        })
    }

    /// First sync of a device: optionally discard the server's records,
    /// apply the device's commands and return a full snapshot.
    pub async fn first_sync(
        &self,
        owner_id: &str,
        request: &FirstSyncRequest,
    ) -> Result<SnapshotResponse> {
        {
            let db = self.db.lock().await;

            let tx = begin(db.connection()).await?;
            let result = self.reset_and_apply(&tx, owner_id, request).await;
            finish(tx, result).await?;
        }

        self.snapshot(owner_id).await
    }

    /// Newest-first view of the owner's checkpoint chain.
    pub async fn history(&self, owner_id: &str, limit: usize) -> Result<Vec<Checkpoint>> {
        let db = self.db.lock().await;
        LibSqlSyncLedger::new(db.connection())
            .history(owner_id, limit)
            .await
    }

    async fn reset_and_apply(
        &self,
        conn: &Connection,
        owner_id: &str,
        request: &FirstSyncRequest,
    ) -> Result<()> {
        if request.sync_type == SyncType::KeepDevice {
            let purged = LibSqlRecordRepository::new(conn).purge_owner(owner_id).await?;
            tracing::info!(
                owner = user_fingerprint(owner_id),
                purged,
                "Purged server records for keep-device first sync"
            );
        }

        if !request.commands.is_empty() {
            self.apply_batch(conn, owner_id, &request.commands).await?;
        }
        Ok(())
    }

    async fn apply_batch(
        &self,
        conn: &Connection,
        owner_id: &str,
        commands: &[Command],
    ) -> Result<CommandsResponse> {
        let mut batch = Batch::new();

        for command in commands {
            let kind = command.command_type();
            let handler = kind.and_then(|kind| self.handlers.get(&kind.resource_type()));

            let outcome = match (kind, handler) {
                (Some(kind), Some(handler)) => {
                    let args = batch.resolve_args(command);
                    handler.apply(conn, owner_id, kind, &args).await?
                }
                _ => CommandOutcome::rejected(UNSUPPORTED_COMMAND),
            };

            tracing::debug!(
                command = %command.uuid,
                kind = %command.kind,
                ok = matches!(outcome, CommandOutcome::Applied { .. }),
                "Applied command"
            );
            batch.record(command, kind, outcome);
        }

        let checkpoint = LibSqlSyncLedger::new(conn)
            .mint(owner_id, batch.touched())
            .await?;
        tracing::info!(
            owner = user_fingerprint(owner_id),
            commands = commands.len(),
            applied = batch.applied(),
            checkpoint = %checkpoint.id,
            "Replayed command batch"
        );

        let (sync_status, temp_id_mapping) = batch.finish();
        Ok(CommandsResponse {
            sync_token: checkpoint.id,
            sync_status,
            temp_id_mapping,
        })
    }
}

async fn load_user(conn: &Connection, owner_id: &str) -> Result<UserProfile> {
    LibSqlUserRepository::new(conn)
        .get(owner_id)
        .await?
        .ok_or_else(|| Error::NotFound("User".to_string()))
}

async fn begin(conn: &Connection) -> Result<Transaction> {
    Ok(conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .await?)
}

/// Commit on success, roll back on any failure. A transaction dropped
/// without reaching here is rolled back by libsql.
async fn finish<T>(tx: Transaction, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            tx.rollback().await.ok();
            tracing::warn!("Rolled back sync transaction: {e}");
            Err(e)
        }
    }
}
