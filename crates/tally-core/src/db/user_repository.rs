//! User directory repository

use crate::error::Result;
use crate::models::UserProfile;
use libsql::{params, Connection};

/// Trait for user profile storage operations (async)
#[allow(async_fn_in_trait)]
pub trait UserRepository {
    /// Insert the user on first sight, refreshing the email otherwise.
    /// Roles and the active flag of an existing user are kept.
    async fn upsert(&self, id: &str, email: Option<&str>) -> Result<UserProfile>;

    /// Look up a user by id
    async fn get(&self, id: &str) -> Result<Option<UserProfile>>;
}

/// libSQL implementation of `UserRepository`
pub struct LibSqlUserRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlUserRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_user(row: &libsql::Row) -> Result<UserProfile> {
        let roles: String = row.get(2)?;
        Ok(UserProfile {
            id: row.get(0)?,
            email: row.get(1)?,
            roles: serde_json::from_str(&roles)?,
            is_active: row.get::<i32>(3)? != 0,
        })
    }
}

impl UserRepository for LibSqlUserRepository<'_> {
    async fn upsert(&self, id: &str, email: Option<&str>) -> Result<UserProfile> {
        let now = chrono::Utc::now().timestamp_millis();
        let default_roles = serde_json::to_string(&UserProfile::new(id, None).roles)?;

        self.conn
            .execute(
                "INSERT INTO users (id, email, roles, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 1, ?4, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    email = COALESCE(excluded.email, users.email),
                    updated_at = excluded.updated_at",
                params![id, email, default_roles, now],
            )
            .await?;

        self.get(id)
            .await?
            .ok_or_else(|| crate::error::Error::Database(format!("User {id} missing after upsert")))
    }

    async fn get(&self, id: &str) -> Result<Option<UserProfile>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, email, roles, is_active FROM users WHERE id = ?",
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_user(&row)?)),
            None => Ok(None),
        }
    }
}
