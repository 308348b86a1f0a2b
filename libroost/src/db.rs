//! Database operations for Roost
//!
//! All mutation of shared state goes through single guarded statements so
//! concurrent callers cannot double-consume a handshake state or
//! double-dispatch a post.

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::error::{DbError, Result, RoostError};
use crate::types::{
    Account, AccountKind, AccountStatus, List, ListMember, ListVisibility, Post, PostStatus, Stats,
};

/// Typed filter for post queries and bulk deletion.
///
/// Every criterion is an explicit field bound as a parameter; SQL text is
/// never assembled from caller-supplied strings.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub account_id: Option<i64>,
    pub status: Option<PostStatus>,
    pub created_before: Option<DateTime<Utc>>,
}

impl PostFilter {
    pub fn account(mut self, account_id: i64) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn status(mut self, status: PostStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn created_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.created_before = Some(cutoff);
        self
    }

    fn where_clause(&self) -> String {
        let mut clauses = vec!["1=1"];
        if self.account_id.is_some() {
            clauses.push("account_id = ?");
        }
        if self.status.is_some() {
            clauses.push("status = ?");
        }
        if self.created_before.is_some() {
            clauses.push("created_at < ?");
        }
        clauses.join(" AND ")
    }

    fn bind<'q>(
        &'q self,
        mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        if let Some(account_id) = self.account_id {
            query = query.bind(account_id);
        }
        if let Some(status) = self.status {
            query = query.bind(status.as_str());
        }
        if let Some(cutoff) = self.created_before {
            query = query.bind(cutoff);
        }
        query
    }
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(crate::error::DbError::IoError)?;
        }

        // Use forward slashes for SQLite URL (works on both Windows and Unix)
        let db_url = format!("sqlite://{}", expanded_path.replace('\\', "/"));
        let options = sqlx::sqlite::SqliteConnectOptions::from_str(&db_url)
            .map_err(crate::error::DbError::SqlxError)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        Self::migrate(pool).await
    }

    /// In-memory database for tests and dry runs.
    ///
    /// Pinned to a single connection because every SQLite `:memory:`
    /// connection is its own empty database.
    pub async fn open_in_memory() -> Result<Self> {
        let options = sqlx::sqlite::SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(crate::error::DbError::SqlxError)?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        Self::migrate(pool).await
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(crate::error::DbError::MigrationError)?;

        Ok(Self { pool })
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Insert or refresh an account keyed by handle.
    ///
    /// A re-authorization replaces the stored tokens, reactivates the
    /// account, and clears any legacy token secret. Token arguments are
    /// already vault-encrypted.
    pub async fn upsert_account(
        &self,
        handle: &str,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<Account> {
        let now = Utc::now();

        let row = sqlx::query(
            r#"
            INSERT INTO account (handle, access_token, refresh_token, status, kind, created_at)
            VALUES (?, ?, ?, 'active', 'managed', ?)
            ON CONFLICT(handle) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                access_token_secret = NULL,
                status = 'active',
                updated_at = excluded.created_at
            RETURNING id
            "#,
        )
        .bind(handle)
        .bind(access_token)
        .bind(refresh_token)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        let id: i64 = row.get("id");
        self.get_account(id)
            .await?
            .ok_or_else(|| RoostError::NotFound(format!("account {}", id)))
    }

    /// Get an account by ID
    pub async fn get_account(&self, id: i64) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, handle, access_token, access_token_secret, refresh_token,
                   status, kind, created_at, updated_at
            FROM account WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.map(account_from_row))
    }

    /// Get an account by handle
    pub async fn get_account_by_handle(&self, handle: &str) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, handle, access_token, access_token_secret, refresh_token,
                   status, kind, created_at, updated_at
            FROM account WHERE handle = ?
            "#,
        )
        .bind(handle)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.map(account_from_row))
    }

    /// List all accounts, ordered by handle
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r#"
            SELECT id, handle, access_token, access_token_secret, refresh_token,
                   status, kind, created_at, updated_at
            FROM account ORDER BY handle
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows.into_iter().map(account_from_row).collect())
    }

    pub async fn list_accounts_by_kind(&self, kind: AccountKind) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r#"
            SELECT id, handle, access_token, access_token_secret, refresh_token,
                   status, kind, created_at, updated_at
            FROM account WHERE kind = ? ORDER BY handle
            "#,
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows.into_iter().map(account_from_row).collect())
    }

    /// Update account status. Returns false if no such account.
    pub async fn set_account_status(&self, id: i64, status: &AccountStatus) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE account SET status = ?, updated_at = ? WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Update account kind. Returns false if no such account.
    pub async fn set_account_kind(&self, id: i64, kind: AccountKind) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE account SET kind = ?, updated_at = ? WHERE id = ?
            "#,
        )
        .bind(kind.as_str())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete an account. Posts and list memberships cascade.
    pub async fn delete_account(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM account WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Bulk-delete accounts in any of the given statuses. Used by the
    /// cleanup surface to purge failed or suspended accounts.
    pub async fn delete_accounts_by_status(&self, statuses: &[AccountStatus]) -> Result<u64> {
        if statuses.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; statuses.len()].join(", ");
        let query_str = format!("DELETE FROM account WHERE status IN ({})", placeholders);

        let mut query = sqlx::query(&query_str);
        for status in statuses {
            query = query.bind(status.as_str());
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    // ------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------

    /// Queue a post for dispatch.
    pub async fn create_post(&self, account_id: i64, body: &str) -> Result<Post> {
        if body.trim().is_empty() {
            return Err(RoostError::InvalidInput("post body is empty".to_string()));
        }

        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO post (account_id, body, status, created_at)
            VALUES (?, ?, 'pending', ?)
            RETURNING id
            "#,
        )
        .bind(account_id)
        .bind(body)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        let id: i64 = row.get("id");
        self.get_post(id)
            .await?
            .ok_or_else(|| RoostError::NotFound(format!("post {}", id)))
    }

    /// Get a post by ID
    pub async fn get_post(&self, id: i64) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, body, status, remote_id, error, created_at, posted_at
            FROM post WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.map(post_from_row))
    }

    /// Query posts matching a filter, newest first.
    pub async fn query_posts(&self, filter: &PostFilter, limit: usize) -> Result<Vec<Post>> {
        let query_str = format!(
            r#"
            SELECT id, account_id, body, status, remote_id, error, created_at, posted_at
            FROM post
            WHERE {}
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
            filter.where_clause()
        );

        let query = filter.bind(sqlx::query(&query_str)).bind(limit as i64);

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows.into_iter().map(post_from_row).collect())
    }

    /// All pending posts, oldest first, for batch dispatch.
    pub async fn pending_posts(&self) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, body, status, remote_id, error, created_at, posted_at
            FROM post WHERE status = 'pending'
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows.into_iter().map(post_from_row).collect())
    }

    /// Transition a pending post to posted, recording the remote ID.
    ///
    /// Guarded on the current status; returns false if the post was not
    /// pending, so a concurrent dispatcher that lost the race sees it.
    pub async fn mark_post_posted(&self, id: i64, remote_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE post
            SET status = 'posted', remote_id = ?, posted_at = ?, error = NULL
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(remote_id)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Transition a pending post to failed, recording the diagnostic.
    /// Same guard as [`mark_post_posted`](Self::mark_post_posted).
    pub async fn mark_post_failed(&self, id: i64, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE post
            SET status = 'failed', error = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_post(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM post WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Bulk-delete posts matching a filter. Returns the number deleted.
    pub async fn delete_posts(&self, filter: &PostFilter) -> Result<u64> {
        let query_str = format!("DELETE FROM post WHERE {}", filter.where_clause());

        let result = filter
            .bind(sqlx::query(&query_str))
            .execute(&self.pool)
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    // ------------------------------------------------------------------
    // OAuth handshake state
    // ------------------------------------------------------------------

    /// Store a handshake state and its verifier.
    ///
    /// A duplicate state token is a conflict, never an overwrite; the
    /// verifier bound to a state must not change under an attacker replay.
    pub async fn put_oauth_state(&self, state: &str, verifier: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO oauth_state (state, verifier, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(state)
        .bind(verifier)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                if e.as_database_error()
                    .map(|d| d.is_unique_violation())
                    .unwrap_or(false)
                {
                    Err(RoostError::Conflict(
                        "authorization state already exists".to_string(),
                    ))
                } else {
                    Err(DbError::SqlxError(e).into())
                }
            }
        }
    }

    /// Atomically consume a handshake state, returning its verifier.
    ///
    /// The row is deleted in the same statement that reads it, so a state
    /// can be consumed at most once: of two concurrent callbacks, exactly
    /// one gets the verifier. A state older than `ttl` is consumed but
    /// reported as absent.
    pub async fn take_oauth_state(&self, state: &str, ttl: Duration) -> Result<Option<String>> {
        let row = sqlx::query(
            r#"
            DELETE FROM oauth_state WHERE state = ?
            RETURNING verifier, created_at
            "#,
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let created_at: DateTime<Utc> = row.get("created_at");
        if Utc::now() - created_at > ttl {
            tracing::warn!(age_secs = (Utc::now() - created_at).num_seconds(),
                "expired authorization state presented; discarding");
            return Ok(None);
        }

        Ok(Some(row.get("verifier")))
    }

    /// Delete handshake states older than `ttl`. Returns the number purged.
    pub async fn purge_expired_oauth_states(&self, ttl: Duration) -> Result<u64> {
        let cutoff = Utc::now() - ttl;
        let result = sqlx::query("DELETE FROM oauth_state WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    // ------------------------------------------------------------------
    // Lists and memberships
    // ------------------------------------------------------------------

    /// Record a list created on the remote platform.
    pub async fn insert_list(
        &self,
        remote_id: &str,
        name: &str,
        description: Option<&str>,
        visibility: ListVisibility,
        owner_account_id: i64,
    ) -> Result<List> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO list (remote_id, name, description, visibility, owner_account_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(remote_id)
        .bind(name)
        .bind(description)
        .bind(visibility.as_str())
        .bind(owner_account_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        let id: i64 = row.get("id");
        self.get_list(id)
            .await?
            .ok_or_else(|| RoostError::NotFound(format!("list {}", id)))
    }

    pub async fn get_list(&self, id: i64) -> Result<Option<List>> {
        let row = sqlx::query(
            r#"
            SELECT id, remote_id, name, description, visibility, owner_account_id,
                   created_at, updated_at
            FROM list WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.map(list_from_row))
    }

    pub async fn list_lists(&self) -> Result<Vec<List>> {
        let rows = sqlx::query(
            r#"
            SELECT id, remote_id, name, description, visibility, owner_account_id,
                   created_at, updated_at
            FROM list ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows.into_iter().map(list_from_row).collect())
    }

    /// Update the local mirror of a list after the remote update succeeded.
    pub async fn update_list_row(
        &self,
        id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE list SET name = ?, description = ?, updated_at = ? WHERE id = ?
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete the local mirror of a list. Memberships cascade.
    pub async fn delete_list_row(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM list WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Record a membership. Returns false if the account was already a
    /// member.
    pub async fn add_list_member(&self, list_id: i64, account_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO list_member (list_id, account_id, added_at)
            VALUES (?, ?, ?)
            ON CONFLICT(list_id, account_id) DO NOTHING
            "#,
        )
        .bind(list_id)
        .bind(account_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn is_list_member(&self, list_id: i64, account_id: i64) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM list_member WHERE list_id = ? AND account_id = ?",
        )
        .bind(list_id)
        .bind(account_id)
        .fetch_one(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.get::<i64, _>("n") > 0)
    }

    pub async fn remove_list_member(&self, list_id: i64, account_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM list_member WHERE list_id = ? AND account_id = ?")
            .bind(list_id)
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Members of a list joined with their account rows, ordered by handle.
    pub async fn list_members(&self, list_id: i64) -> Result<Vec<ListMember>> {
        let rows = sqlx::query(
            r#"
            SELECT lm.account_id, a.handle, a.status, lm.added_at
            FROM list_member lm
            JOIN account a ON a.id = lm.account_id
            WHERE lm.list_id = ?
            ORDER BY a.handle
            "#,
        )
        .bind(list_id)
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows
            .into_iter()
            .map(|r| ListMember {
                account_id: r.get("account_id"),
                handle: r.get("handle"),
                status: AccountStatus::parse(&r.get::<String, _>("status")),
                added_at: r.get("added_at"),
            })
            .collect())
    }

    pub async fn list_member_count(&self, list_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM list_member WHERE list_id = ?")
            .bind(list_id)
            .fetch_one(&self.pool)
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.get("n"))
    }

    // ------------------------------------------------------------------
    // Stats
    // ------------------------------------------------------------------

    pub async fn stats(&self) -> Result<Stats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM account) AS accounts,
                (SELECT COUNT(*) FROM post) AS posts_total,
                (SELECT COUNT(*) FROM post WHERE status = 'pending') AS posts_pending,
                (SELECT COUNT(*) FROM post WHERE status = 'posted') AS posts_posted,
                (SELECT COUNT(*) FROM post WHERE status = 'failed') AS posts_failed
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(Stats {
            accounts: row.get("accounts"),
            posts_total: row.get("posts_total"),
            posts_pending: row.get("posts_pending"),
            posts_posted: row.get("posts_posted"),
            posts_failed: row.get("posts_failed"),
        })
    }
}

fn account_from_row(r: SqliteRow) -> Account {
    Account {
        id: r.get("id"),
        handle: r.get("handle"),
        access_token: r.get("access_token"),
        access_token_secret: r.get("access_token_secret"),
        refresh_token: r.get("refresh_token"),
        status: AccountStatus::parse(&r.get::<String, _>("status")),
        kind: AccountKind::parse(&r.get::<String, _>("kind")).unwrap_or(AccountKind::Managed),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

fn post_from_row(r: SqliteRow) -> Post {
    Post {
        id: r.get("id"),
        account_id: r.get("account_id"),
        body: r.get("body"),
        status: PostStatus::parse(&r.get::<String, _>("status")).unwrap_or(PostStatus::Pending),
        remote_id: r.get("remote_id"),
        error: r.get("error"),
        created_at: r.get("created_at"),
        posted_at: r.get("posted_at"),
    }
}

fn list_from_row(r: SqliteRow) -> List {
    List {
        id: r.get("id"),
        remote_id: r.get("remote_id"),
        name: r.get("name"),
        description: r.get("description"),
        visibility: ListVisibility::parse(&r.get::<String, _>("visibility"))
            .unwrap_or(ListVisibility::Private),
        owner_account_id: r.get("owner_account_id"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    async fn test_account(db: &Database, handle: &str) -> Account {
        db.upsert_account(handle, "enc-token", Some("enc-refresh"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_database_new_creates_parent_directories() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("roost.db");

        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        test_account(&db, "alice").await;

        // Reopening sees the same data
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        assert_eq!(db.list_accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_account_inserts_then_updates() {
        let db = test_db().await;

        let first = test_account(&db, "alice").await;
        assert_eq!(first.handle, "alice");
        assert_eq!(first.status, AccountStatus::Active);
        assert_eq!(first.kind, AccountKind::Managed);

        let second = db
            .upsert_account("alice", "new-enc-token", None)
            .await
            .unwrap();
        assert_eq!(second.id, first.id, "upsert must not create a second row");
        assert_eq!(second.access_token, "new-enc-token");
        assert_eq!(second.refresh_token, None);

        assert_eq!(db.list_accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_reactivates_and_clears_legacy_secret() {
        let db = test_db().await;
        let account = test_account(&db, "alice").await;

        // Simulate a legacy row: failed status, token secret set
        sqlx::query("UPDATE account SET status = 'failed', access_token_secret = 'old' WHERE id = ?")
            .bind(account.id)
            .execute(&db.pool)
            .await
            .unwrap();

        let refreshed = db
            .upsert_account("alice", "fresh-token", Some("fresh-refresh"))
            .await
            .unwrap();
        assert_eq!(refreshed.status, AccountStatus::Active);
        assert!(!refreshed.has_legacy_credentials());
    }

    #[tokio::test]
    async fn test_delete_accounts_by_status() {
        let db = test_db().await;
        let a = test_account(&db, "alice").await;
        let b = test_account(&db, "bob").await;
        test_account(&db, "carol").await;

        db.set_account_status(a.id, &AccountStatus::Failed)
            .await
            .unwrap();
        db.set_account_status(b.id, &AccountStatus::Suspended)
            .await
            .unwrap();

        let deleted = db
            .delete_accounts_by_status(&[AccountStatus::Failed, AccountStatus::Suspended])
            .await
            .unwrap();
        assert_eq!(deleted, 2);

        let remaining = db.list_accounts().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].handle, "carol");
    }

    #[tokio::test]
    async fn test_create_post_rejects_empty_body() {
        let db = test_db().await;
        let account = test_account(&db, "alice").await;

        let result = db.create_post(account.id, "   ").await;
        assert!(matches!(result, Err(RoostError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_mark_post_posted_is_guarded() {
        let db = test_db().await;
        let account = test_account(&db, "alice").await;
        let post = db.create_post(account.id, "hello").await.unwrap();

        assert!(db.mark_post_posted(post.id, "999").await.unwrap());
        // Second transition loses: the post is no longer pending
        assert!(!db.mark_post_posted(post.id, "1000").await.unwrap());
        assert!(!db.mark_post_failed(post.id, "late failure").await.unwrap());

        let stored = db.get_post(post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Posted);
        assert_eq!(stored.remote_id, Some("999".to_string()));
        assert!(stored.posted_at.is_some());
        assert_eq!(stored.error, None);
    }

    #[tokio::test]
    async fn test_mark_post_failed_records_diagnostic() {
        let db = test_db().await;
        let account = test_account(&db, "alice").await;
        let post = db.create_post(account.id, "hello").await.unwrap();

        assert!(db
            .mark_post_failed(post.id, "remote API error (status 403): forbidden")
            .await
            .unwrap());

        let stored = db.get_post(post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        assert!(stored.error.unwrap().contains("403"));
        assert_eq!(stored.remote_id, None);
    }

    #[tokio::test]
    async fn test_query_posts_with_filter() {
        let db = test_db().await;
        let alice = test_account(&db, "alice").await;
        let bob = test_account(&db, "bob").await;

        let p1 = db.create_post(alice.id, "one").await.unwrap();
        let p2 = db.create_post(alice.id, "two").await.unwrap();
        db.create_post(bob.id, "three").await.unwrap();
        db.mark_post_posted(p1.id, "1").await.unwrap();

        let alices = db
            .query_posts(&PostFilter::default().account(alice.id), 10)
            .await
            .unwrap();
        assert_eq!(alices.len(), 2);

        let pending = db
            .query_posts(&PostFilter::default().status(PostStatus::Pending), 10)
            .await
            .unwrap();
        assert_eq!(pending.len(), 2);

        let alice_pending = db
            .query_posts(
                &PostFilter::default()
                    .account(alice.id)
                    .status(PostStatus::Pending),
                10,
            )
            .await
            .unwrap();
        assert_eq!(alice_pending.len(), 1);
        assert_eq!(alice_pending[0].id, p2.id);
    }

    #[tokio::test]
    async fn test_delete_posts_by_filter() {
        let db = test_db().await;
        let account = test_account(&db, "alice").await;

        let p1 = db.create_post(account.id, "one").await.unwrap();
        db.create_post(account.id, "two").await.unwrap();
        db.mark_post_failed(p1.id, "boom").await.unwrap();

        let deleted = db
            .delete_posts(&PostFilter::default().status(PostStatus::Failed))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(
            db.query_posts(&PostFilter::default(), 10).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_oauth_state_consumed_at_most_once() {
        let db = test_db().await;
        db.put_oauth_state("state-1", "verifier-1").await.unwrap();

        let ttl = Duration::minutes(15);
        let first = db.take_oauth_state("state-1", ttl).await.unwrap();
        assert_eq!(first, Some("verifier-1".to_string()));

        let second = db.take_oauth_state("state-1", ttl).await.unwrap();
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn test_oauth_state_duplicate_is_conflict() {
        let db = test_db().await;
        db.put_oauth_state("state-1", "verifier-1").await.unwrap();

        let result = db.put_oauth_state("state-1", "verifier-2").await;
        assert!(matches!(result, Err(RoostError::Conflict(_))));

        // The original verifier is untouched
        let taken = db
            .take_oauth_state("state-1", Duration::minutes(15))
            .await
            .unwrap();
        assert_eq!(taken, Some("verifier-1".to_string()));
    }

    #[tokio::test]
    async fn test_oauth_state_expired_is_consumed_but_absent() {
        let db = test_db().await;
        db.put_oauth_state("stale", "verifier").await.unwrap();

        sqlx::query("UPDATE oauth_state SET created_at = ? WHERE state = 'stale'")
            .bind(Utc::now() - Duration::minutes(20))
            .execute(&db.pool)
            .await
            .unwrap();

        let taken = db
            .take_oauth_state("stale", Duration::minutes(15))
            .await
            .unwrap();
        assert_eq!(taken, None);

        // The row was still deleted
        let again = db
            .take_oauth_state("stale", Duration::minutes(15))
            .await
            .unwrap();
        assert_eq!(again, None);
    }

    #[tokio::test]
    async fn test_purge_expired_oauth_states() {
        let db = test_db().await;
        db.put_oauth_state("fresh", "v1").await.unwrap();
        db.put_oauth_state("stale", "v2").await.unwrap();

        sqlx::query("UPDATE oauth_state SET created_at = ? WHERE state = 'stale'")
            .bind(Utc::now() - Duration::minutes(30))
            .execute(&db.pool)
            .await
            .unwrap();

        let purged = db
            .purge_expired_oauth_states(Duration::minutes(15))
            .await
            .unwrap();
        assert_eq!(purged, 1);

        assert!(db
            .take_oauth_state("fresh", Duration::minutes(15))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_list_membership_unique() {
        let db = test_db().await;
        let owner = test_account(&db, "owner").await;
        let member = test_account(&db, "member").await;

        let list = db
            .insert_list("L1", "My List", None, ListVisibility::Private, owner.id)
            .await
            .unwrap();

        assert!(db.add_list_member(list.id, member.id).await.unwrap());
        assert!(!db.add_list_member(list.id, member.id).await.unwrap());
        assert_eq!(db.list_member_count(list.id).await.unwrap(), 1);

        let members = db.list_members(list.id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].handle, "member");
    }

    #[tokio::test]
    async fn test_cascades_on_account_and_list_delete() {
        let db = test_db().await;
        let owner = test_account(&db, "owner").await;
        let member = test_account(&db, "member").await;

        let post = db.create_post(member.id, "hello").await.unwrap();
        let list = db
            .insert_list("L1", "My List", None, ListVisibility::Private, owner.id)
            .await
            .unwrap();
        db.add_list_member(list.id, member.id).await.unwrap();

        // Deleting the member account removes its post and membership
        assert!(db.delete_account(member.id).await.unwrap());
        assert!(db.get_post(post.id).await.unwrap().is_none());
        assert_eq!(db.list_member_count(list.id).await.unwrap(), 0);

        // Deleting the owner account removes the list itself
        assert!(db.delete_account(owner.id).await.unwrap());
        assert!(db.get_list(list.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats_counts() {
        let db = test_db().await;
        let account = test_account(&db, "alice").await;

        let p1 = db.create_post(account.id, "one").await.unwrap();
        let p2 = db.create_post(account.id, "two").await.unwrap();
        db.create_post(account.id, "three").await.unwrap();
        db.mark_post_posted(p1.id, "1").await.unwrap();
        db.mark_post_failed(p2.id, "boom").await.unwrap();

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.accounts, 1);
        assert_eq!(stats.posts_total, 3);
        assert_eq!(stats.posts_pending, 1);
        assert_eq!(stats.posts_posted, 1);
        assert_eq!(stats.posts_failed, 1);
    }
}
