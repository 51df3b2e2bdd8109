//! Sync token ledger: the append-only checkpoint chain of each user

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::models::{Checkpoint, CheckpointId, RecordId, ResourceType, TouchedSet};
use libsql::{params, Connection};

/// Trait for checkpoint ledger operations (async)
#[allow(async_fn_in_trait)]
pub trait SyncLedger {
    /// Append a checkpoint recording `touched`
    async fn mint(&self, owner_id: &str, touched: &TouchedSet) -> Result<Checkpoint>;

    /// Most recent checkpoint of the owner, if any
    async fn latest(&self, owner_id: &str) -> Result<Option<Checkpoint>>;

    /// Most recent checkpoint, creating the owner's bootstrap checkpoint
    /// when the chain is empty
    async fn latest_or_bootstrap(&self, owner_id: &str) -> Result<Checkpoint>;

    /// The checkpoint `since_id` and every later checkpoint of the owner,
    /// oldest first
    async fn checkpoints_since(&self, owner_id: &str, since_id: &str) -> Result<Vec<Checkpoint>>;

    /// Newest-first listing of the owner's chain
    async fn history(&self, owner_id: &str, limit: usize) -> Result<Vec<Checkpoint>>;
}

/// libSQL implementation of `SyncLedger`
pub struct LibSqlSyncLedger<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncLedger<'a> {
    /// Create a new ledger with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a checkpoint header (without touches) from a database row
    fn parse_checkpoint(row: &libsql::Row) -> Result<Checkpoint> {
        let id: String = row.get(0)?;
        Ok(Checkpoint {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid checkpoint id in store: {id}")))?,
            owner_id: row.get(1)?,
            touched: TouchedSet::new(),
            full_sync: row.get::<i32>(2)? != 0,
            created_at: row.get(3)?,
        })
    }

    async fn find(&self, owner_id: &str, id: &CheckpointId) -> Result<Option<Checkpoint>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, owner_id, full_sync, created_at FROM checkpoints
                 WHERE id = ? AND owner_id = ?",
                params![id.as_str(), owner_id],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let mut checkpoint = Self::parse_checkpoint(&row)?;
        checkpoint.touched = self.touches_of(&checkpoint.id).await?;
        Ok(Some(checkpoint))
    }

    async fn touches_of(&self, id: &CheckpointId) -> Result<TouchedSet> {
        let mut rows = self
            .conn
            .query(
                "SELECT resource_type, record_id FROM checkpoint_touches WHERE checkpoint_id = ?",
                [id.as_str()],
            )
            .await?;

        let mut touched = TouchedSet::new();
        while let Some(row) = rows.next().await? {
            let (resource, record) = Self::parse_touch(&row, 0)?;
            touched.insert(resource, record);
        }
        Ok(touched)
    }

    fn parse_touch(row: &libsql::Row, offset: i32) -> Result<(ResourceType, RecordId)> {
        let resource: String = row.get(offset)?;
        let record: String = row.get(offset + 1)?;
        let resource = resource.parse().map_err(Error::Database)?;
        let record = record
            .parse()
            .map_err(|_| Error::Database(format!("Invalid touched record id: {record}")))?;
        Ok((resource, record))
    }

    async fn list(&self, sql: &str, owner_id: &str, bound: i64) -> Result<Vec<Checkpoint>> {
        let mut rows = self.conn.query(sql, params![owner_id, bound]).await?;

        let mut checkpoints = Vec::new();
        while let Some(row) = rows.next().await? {
            checkpoints.push(Self::parse_checkpoint(&row)?);
        }
        Ok(checkpoints)
    }
}

impl SyncLedger for LibSqlSyncLedger<'_> {
    async fn mint(&self, owner_id: &str, touched: &TouchedSet) -> Result<Checkpoint> {
        let id = CheckpointId::new();
        let now = chrono::Utc::now().timestamp_millis();

        // Timestamp is bumped past the owner's newest checkpoint so the chain
        // stays strictly ordered even within one millisecond.
        self.conn
            .execute(
                "INSERT INTO checkpoints (id, owner_id, full_sync, created_at)
                 SELECT ?1, ?2, 0, MAX(?3, COALESCE(MAX(created_at), 0) + 1)
                 FROM checkpoints WHERE owner_id = ?2",
                params![id.as_str(), owner_id, now],
            )
            .await?;

        for (resource, record) in touched.iter() {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO checkpoint_touches (checkpoint_id, resource_type, record_id)
                     VALUES (?, ?, ?)",
                    params![id.as_str(), resource.as_str(), record.as_str()],
                )
                .await?;
        }

        let checkpoint = self
            .find(owner_id, &id)
            .await?
            .ok_or_else(|| Error::Database(format!("Checkpoint {id} vanished after insert")))?;

        tracing::debug!(
            checkpoint = %checkpoint.id,
            touched = checkpoint.touched.len(),
            "Minted checkpoint"
        );
        Ok(checkpoint)
    }

    async fn latest(&self, owner_id: &str) -> Result<Option<Checkpoint>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM checkpoints WHERE owner_id = ? ORDER BY created_at DESC LIMIT 1",
                [owner_id],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let id: String = row.get(0)?;
        let id = id
            .parse()
            .map_err(|_| Error::Database(format!("Invalid checkpoint id in store: {id}")))?;
        self.find(owner_id, &id).await
    }

    async fn latest_or_bootstrap(&self, owner_id: &str) -> Result<Checkpoint> {
        if let Some(checkpoint) = self.latest(owner_id).await? {
            return Ok(checkpoint);
        }

        // A concurrent first sync may win this insert; the partial unique
        // index turns ours into a no-op and both callers read the same row.
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO checkpoints (id, owner_id, full_sync, created_at)
                 SELECT ?1, ?2, 1, MAX(?3, COALESCE(MAX(created_at), 0) + 1)
                 FROM checkpoints WHERE owner_id = ?2",
                params![
                    CheckpointId::new().as_str(),
                    owner_id,
                    chrono::Utc::now().timestamp_millis()
                ],
            )
            .await?;
        if inserted > 0 {
            tracing::info!("Created bootstrap checkpoint");
        }

        self.latest(owner_id)
            .await?
            .ok_or_else(|| Error::Database("Bootstrap checkpoint missing after insert".into()))
    }

    async fn checkpoints_since(&self, owner_id: &str, since_id: &str) -> Result<Vec<Checkpoint>> {
        let not_found = || Error::NotFound(format!("Sync token {since_id}"));

        let since_id: CheckpointId = since_id.trim().parse().map_err(|_| not_found())?;
        let since = self
            .find(owner_id, &since_id)
            .await?
            .ok_or_else(not_found)?;

        let mut checkpoints = self
            .list(
                "SELECT id, owner_id, full_sync, created_at FROM checkpoints
                 WHERE owner_id = ? AND created_at >= ?
                 ORDER BY created_at ASC",
                owner_id,
                since.created_at,
            )
            .await?;

        let mut rows = self
            .conn
            .query(
                "SELECT t.checkpoint_id, t.resource_type, t.record_id
                 FROM checkpoint_touches t
                 JOIN checkpoints c ON c.id = t.checkpoint_id
                 WHERE c.owner_id = ? AND c.created_at >= ?",
                params![owner_id, since.created_at],
            )
            .await?;

        let mut touches: HashMap<String, TouchedSet> = HashMap::new();
        while let Some(row) = rows.next().await? {
            let checkpoint_id: String = row.get(0)?;
            let (resource, record) = Self::parse_touch(&row, 1)?;
            touches
                .entry(checkpoint_id)
                .or_default()
                .insert(resource, record);
        }

        for checkpoint in &mut checkpoints {
            if let Some(touched) = touches.remove(&checkpoint.id.as_str()) {
                checkpoint.touched = touched;
            }
        }

        Ok(checkpoints)
    }

    async fn history(&self, owner_id: &str, limit: usize) -> Result<Vec<Checkpoint>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut checkpoints = self
            .list(
                "SELECT id, owner_id, full_sync, created_at FROM checkpoints
                 WHERE owner_id = ?
                 ORDER BY created_at DESC
                 LIMIT ?",
                owner_id,
                limit,
            )
            .await?;

        for checkpoint in &mut checkpoints {
            checkpoint.touched = self.touches_of(&checkpoint.id).await?;
        }
        Ok(checkpoints)
    }
}
