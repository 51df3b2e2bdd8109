//! Record store implementation

use crate::error::{Error, Result};
use crate::models::{NewRecord, Record, RecordFilter, RecordId, RecordPatch};
use libsql::params::Params;
use libsql::{params, Connection, Value};

const RECORD_COLUMNS: &str = "id, owner_id, name, icon, color, sort_order, currency, \
                              is_deleted, is_archived, is_favorite, created_at, updated_at";

/// Trait for business record storage operations (async)
#[allow(async_fn_in_trait)]
pub trait RecordRepository {
    /// Create a new live record owned by `owner_id`
    async fn create(&self, owner_id: &str, attrs: NewRecord) -> Result<Record>;

    /// Get one of the owner's records, including soft-deleted ones
    async fn get(&self, owner_id: &str, id: &RecordId) -> Result<Option<Record>>;

    /// Mark a record deleted. Already-deleted records are returned unchanged.
    async fn soft_delete(&self, owner_id: &str, id: &RecordId) -> Result<Record>;

    /// Merge `patch` into a live record
    async fn update(&self, owner_id: &str, id: &RecordId, patch: &RecordPatch) -> Result<Record>;

    /// List the owner's records matching `filter`, in insertion order
    async fn list_by_owner(&self, owner_id: &str, filter: RecordFilter) -> Result<Vec<Record>>;

    /// Fetch records by id, in insertion order. Unknown ids are skipped.
    async fn list_by_ids(&self, ids: &[RecordId]) -> Result<Vec<Record>>;

    /// Physically delete every record of the owner, returning the count
    async fn purge_owner(&self, owner_id: &str) -> Result<u64>;
}

/// libSQL implementation of `RecordRepository`
pub struct LibSqlRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a record from a database row
    fn parse_record(row: &libsql::Row) -> Result<Record> {
        let id: String = row.get(0)?;
        Ok(Record {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid record id in store: {id}")))?,
            owner_id: row.get(1)?,
            name: row.get(2)?,
            icon: row.get(3)?,
            color: row.get(4)?,
            order: row.get(5)?,
            currency: row.get(6)?,
            is_deleted: row.get::<i32>(7)? != 0,
            is_archived: row.get::<i32>(8)? != 0,
            is_favorite: row.get::<i32>(9)? != 0,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    async fn query_records(&self, sql: &str, params: Params) -> Result<Vec<Record>> {
        let mut rows = self.conn.query(sql, params).await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }

        Ok(records)
    }

    async fn write(&self, record: &Record) -> Result<()> {
        self.conn
            .execute(
                "UPDATE records
                 SET name = ?, icon = ?, color = ?, sort_order = ?, currency = ?,
                     is_deleted = ?, is_archived = ?, is_favorite = ?, updated_at = ?
                 WHERE id = ? AND owner_id = ?",
                params![
                    record.name.clone(),
                    record.icon.clone(),
                    record.color.clone(),
                    record.order,
                    record.currency.clone(),
                    i32::from(record.is_deleted),
                    i32::from(record.is_archived),
                    i32::from(record.is_favorite),
                    record.updated_at,
                    record.id.as_str(),
                    record.owner_id.clone()
                ],
            )
            .await?;
        Ok(())
    }
}

impl RecordRepository for LibSqlRecordRepository<'_> {
    async fn create(&self, owner_id: &str, attrs: NewRecord) -> Result<Record> {
        let record = Record::new(owner_id, attrs);

        self.conn
            .execute(
                "INSERT INTO records (id, owner_id, name, icon, color, sort_order, currency,
                                      is_deleted, is_archived, is_favorite, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.id.as_str(),
                    record.owner_id.clone(),
                    record.name.clone(),
                    record.icon.clone(),
                    record.color.clone(),
                    record.order,
                    record.currency.clone(),
                    i32::from(record.is_deleted),
                    i32::from(record.is_archived),
                    i32::from(record.is_favorite),
                    record.created_at,
                    record.updated_at
                ],
            )
            .await?;

        Ok(record)
    }

    async fn get(&self, owner_id: &str, id: &RecordId) -> Result<Option<Record>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ? AND owner_id = ?");
        let records = self
            .query_records(
                &sql,
                Params::Positional(vec![
                    Value::Text(id.as_str()),
                    Value::Text(owner_id.to_string()),
                ]),
            )
            .await?;

        Ok(records.into_iter().next())
    }

    async fn soft_delete(&self, owner_id: &str, id: &RecordId) -> Result<Record> {
        let mut record = self
            .get(owner_id, id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if record.is_deleted {
            return Ok(record);
        }

        record.is_deleted = true;
        record.updated_at = chrono::Utc::now()
            .timestamp_millis()
            .max(record.updated_at);
        self.write(&record).await?;

        Ok(record)
    }

    async fn update(&self, owner_id: &str, id: &RecordId, patch: &RecordPatch) -> Result<Record> {
        let mut record = self
            .get(owner_id, id)
            .await?
            .filter(|record| !record.is_deleted)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        record.apply(patch);
        self.write(&record).await?;

        Ok(record)
    }

    async fn list_by_owner(&self, owner_id: &str, filter: RecordFilter) -> Result<Vec<Record>> {
        let mut sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE owner_id = ?");
        let mut values = vec![Value::Text(owner_id.to_string())];

        for (column, flag) in [
            ("is_deleted", filter.deleted),
            ("is_archived", filter.archived),
            ("is_favorite", filter.favorite),
        ] {
            if let Some(flag) = flag {
                sql.push_str(&format!(" AND {column} = ?"));
                values.push(Value::Integer(i64::from(flag)));
            }
        }
        sql.push_str(" ORDER BY rowid ASC");

        self.query_records(&sql, Params::Positional(values)).await
    }

    async fn list_by_ids(&self, ids: &[RecordId]) -> Result<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // One bound JSON array instead of a placeholder per id, so large
        // pulls stay under SQLite's bound-variable limit.
        let ids = serde_json::to_string(&ids.iter().map(RecordId::as_str).collect::<Vec<_>>())?;
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records
             WHERE id IN (SELECT value FROM json_each(?))
             ORDER BY rowid ASC"
        );

        self.query_records(&sql, Params::Positional(vec![Value::Text(ids)]))
            .await
    }

    async fn purge_owner(&self, owner_id: &str) -> Result<u64> {
        let removed = self
            .conn
            .execute("DELETE FROM records WHERE owner_id = ?", [owner_id])
            .await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_and_get() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        let record = repo
            .create(
                "user-1",
                NewRecord {
                    name: "Groceries".to_string(),
                    currency: Some("USD".to_string()),
                    order: Some(3),
                    ..NewRecord::default()
                },
            )
            .await
            .unwrap();

        let fetched = repo.get("user-1", &record.id).await.unwrap().unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_is_owner_scoped() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        let record = repo
            .create("user-1", NewRecord::named("Mine"))
            .await
            .unwrap();

        assert!(repo.get("user-2", &record.id).await.unwrap().is_none());
        let err = repo.soft_delete("user-2", &record.id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_by_owner_in_insertion_order() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        repo.create("user-1", NewRecord::named("First")).await.unwrap();
        repo.create("user-2", NewRecord::named("Other")).await.unwrap();
        repo.create("user-1", NewRecord::named("Second")).await.unwrap();

        let names: Vec<String> = repo
            .list_by_owner("user-1", RecordFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.name)
            .collect();
        assert_eq!(names, vec!["First".to_string(), "Second".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_soft_delete_keeps_history() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        let record = repo
            .create("user-1", NewRecord::named("To delete"))
            .await
            .unwrap();
        let deleted = repo.soft_delete("user-1", &record.id).await.unwrap();
        assert!(deleted.is_deleted);

        let live = repo
            .list_by_owner("user-1", RecordFilter::live())
            .await
            .unwrap();
        assert!(live.is_empty());

        let by_id = repo.list_by_ids(&[record.id]).await.unwrap();
        assert_eq!(by_id.len(), 1);
        assert!(by_id[0].is_deleted);

        // Deleting twice is not an error
        assert!(repo.soft_delete("user-1", &record.id).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_merges_fields() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        let record = repo
            .create(
                "user-1",
                NewRecord {
                    name: "Original".to_string(),
                    color: Some("#ff0000".to_string()),
                    ..NewRecord::default()
                },
            )
            .await
            .unwrap();

        let patch = RecordPatch {
            name: Some("Renamed".to_string()),
            is_archived: Some(true),
            ..RecordPatch::default()
        };
        let updated = repo.update("user-1", &record.id, &patch).await.unwrap();

        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.color.as_deref(), Some("#ff0000"));
        assert!(updated.is_archived);
        assert!(updated.updated_at >= record.updated_at);

        let fetched = repo.get("user-1", &record.id).await.unwrap().unwrap();
        assert_eq!(fetched, updated);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_missing_or_deleted_is_not_found() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        let err = repo
            .update("user-1", &RecordId::new(), &RecordPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let record = repo.create("user-1", NewRecord::named("Gone")).await.unwrap();
        repo.soft_delete("user-1", &record.id).await.unwrap();
        let err = repo
            .update("user-1", &record.id, &RecordPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_by_ids_skips_unknown() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        let record = repo.create("user-1", NewRecord::named("Known")).await.unwrap();
        let records = repo
            .list_by_ids(&[RecordId::new(), record.id])
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, record.id);

        assert!(repo.list_by_ids(&[]).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_by_owner_flag_filters() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        let favorite = repo.create("user-1", NewRecord::named("Fav")).await.unwrap();
        repo.create("user-1", NewRecord::named("Plain")).await.unwrap();
        repo.update(
            "user-1",
            &favorite.id,
            &RecordPatch {
                is_favorite: Some(true),
                ..RecordPatch::default()
            },
        )
        .await
        .unwrap();

        let favorites = repo
            .list_by_owner(
                "user-1",
                RecordFilter {
                    favorite: Some(true),
                    ..RecordFilter::live()
                },
            )
            .await
            .unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].id, favorite.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_purge_owner_only_touches_owner() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        repo.create("user-1", NewRecord::named("A")).await.unwrap();
        repo.create("user-1", NewRecord::named("B")).await.unwrap();
        repo.create("user-2", NewRecord::named("C")).await.unwrap();

        assert_eq!(repo.purge_owner("user-1").await.unwrap(), 2);
        assert!(repo
            .list_by_owner("user-1", RecordFilter::default())
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            repo.list_by_owner("user-2", RecordFilter::default())
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_by_ids_handles_large_id_sets() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        let first = repo.create("user-1", NewRecord::named("First")).await.unwrap();
        let second = repo.create("user-1", NewRecord::named("Second")).await.unwrap();

        let mut ids: Vec<RecordId> = (0..40_000).map(|_| RecordId::new()).collect();
        ids.insert(0, second.id);
        ids.push(first.id);

        let records = repo.list_by_ids(&ids).await.unwrap();
        let found: Vec<RecordId> = records.iter().map(|record| record.id).collect();
        assert_eq!(found, vec![first.id, second.id]);
    }
}
