//! Persistence interfaces and backends for repograph-core.
//!
//! This module defines the persistence abstraction and backend implementations.
//! Crawl rows (repositories, commits) are written idempotently; coordination
//! rows (continuation tasks, execution leases) are the only state executions
//! share with each other.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresPersistence;
pub use self::sqlite::SqlitePersistence;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::CrawlError;

/// Repository row.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RepositoryRecord {
    /// Platform-assigned repository id.
    pub id: i64,
    /// Owner login.
    pub owner_login: Option<String>,
    /// Owner platform id.
    pub owner_id: Option<i64>,
    /// Short name.
    pub name: String,
    /// `owner/name`.
    pub full_name: String,
    /// Primary language.
    pub language: Option<String>,
    /// Fork count.
    pub forks_count: i64,
    /// Star count.
    pub stargazers_count: i64,
    /// Watcher count.
    pub watchers_count: i64,
    /// Subscriber count.
    pub subscribers_count: i64,
    /// Size in kilobytes.
    pub size: i64,
    /// Issues enabled.
    pub has_issues: bool,
    /// Wiki enabled.
    pub has_wiki: bool,
    /// Pages enabled.
    pub has_pages: bool,
    /// Downloads enabled.
    pub has_downloads: bool,
    /// Last push, epoch milliseconds.
    pub pushed_at: Option<i64>,
    /// Creation, epoch milliseconds.
    pub created_at: Option<i64>,
    /// Last update, epoch milliseconds.
    pub updated_at: Option<i64>,
}

/// Commit row.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CommitRecord {
    /// 40-character commit hash.
    pub sha: String,
    /// Owning repository id.
    pub repo_id: i64,
    /// Git author name.
    pub author_name: Option<String>,
    /// Git author email.
    pub author_email: Option<String>,
    /// Author date, epoch milliseconds.
    pub author_date: Option<i64>,
    /// Git committer name.
    pub committer_name: Option<String>,
    /// Git committer email.
    pub committer_email: Option<String>,
    /// Committer date, epoch milliseconds.
    pub committer_date: Option<i64>,
    /// Platform login of the author.
    pub author_login: Option<String>,
    /// Platform id of the author.
    pub author_id: Option<i64>,
    /// Platform login of the committer.
    pub committer_login: Option<String>,
    /// Platform id of the committer.
    pub committer_id: Option<i64>,
    /// Lines added.
    pub additions: i64,
    /// Lines deleted.
    pub deletions: i64,
    /// Lines changed.
    pub total: i64,
    /// Lines added in test code.
    pub test_additions: i64,
    /// Lines deleted in test code.
    pub test_deletions: i64,
    /// Lines changed in test code.
    pub test_changes: i64,
}

/// Stored continuation task.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ContinuationRecord {
    /// Task id.
    pub id: String,
    /// Traversal phase to resume.
    pub discriminator: String,
    /// Serialized resume position.
    pub payload: String,
}

/// Stored execution lease.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LeaseRecord {
    /// Lease id.
    pub id: String,
    /// Acquisition time, epoch milliseconds.
    pub acquired_at: i64,
    /// Expiry time, epoch milliseconds.
    pub expires_at: i64,
}

impl LeaseRecord {
    /// Acquisition time.
    pub fn acquired(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.acquired_at)
    }

    /// Expiry time.
    pub fn expires(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.expires_at)
    }
}

/// Persistence interface used by the crawl engine.
#[async_trait]
pub trait Persistence: Send + Sync {
    // ========================================================================
    // Crawl data
    // ========================================================================

    /// Insert or overwrite a repository row.
    async fn upsert_repository(&self, repository: &RepositoryRecord) -> Result<(), CrawlError>;

    /// Insert a commit row. A sha that is already stored is left untouched.
    ///
    /// Returns true if a row was inserted.
    async fn insert_commit(&self, commit: &CommitRecord) -> Result<bool, CrawlError>;

    /// Fetch a repository row by id.
    async fn get_repository(&self, id: i64) -> Result<Option<RepositoryRecord>, CrawlError>;

    /// Fetch a commit row by sha.
    async fn get_commit(&self, sha: &str) -> Result<Option<CommitRecord>, CrawlError>;

    /// Number of stored repositories.
    async fn count_repositories(&self) -> Result<i64, CrawlError>;

    /// Number of stored commits.
    async fn count_commits(&self) -> Result<i64, CrawlError>;

    // ========================================================================
    // Continuations
    // ========================================================================

    /// Store a continuation task.
    async fn insert_continuation(
        &self,
        id: &str,
        discriminator: &str,
        payload: &str,
    ) -> Result<(), CrawlError>;

    /// Atomically remove and return the oldest continuation task.
    async fn take_oldest_continuation(&self) -> Result<Option<ContinuationRecord>, CrawlError>;

    /// Number of pending continuation tasks.
    async fn count_continuations(&self) -> Result<i64, CrawlError>;

    // ========================================================================
    // Execution leases
    // ========================================================================

    /// Register a lease if fewer than `ceiling` live leases exist.
    ///
    /// Leases that expired before `now_ms` are deleted first, in the same
    /// atomic unit as the count and the insert. Returns false if the ceiling
    /// was reached.
    async fn try_insert_lease(
        &self,
        lease: &LeaseRecord,
        ceiling: u32,
        now_ms: i64,
    ) -> Result<bool, CrawlError>;

    /// Move a live lease's expiry to `expires_at_ms`.
    ///
    /// Returns false if the lease is gone or already expired at `now_ms`; an
    /// expired lease is never revived, since its slot may have been granted
    /// to another execution.
    async fn renew_lease(
        &self,
        id: &str,
        expires_at_ms: i64,
        now_ms: i64,
    ) -> Result<bool, CrawlError>;

    /// Delete a lease. Deleting an unknown lease is not an error.
    ///
    /// Returns true if a row was deleted.
    async fn delete_lease(&self, id: &str) -> Result<bool, CrawlError>;

    /// Delete leases that expired before `now_ms`. Returns the number deleted.
    async fn delete_expired_leases(&self, now_ms: i64) -> Result<u64, CrawlError>;

    /// Number of registered leases, expired or not.
    async fn count_leases(&self) -> Result<i64, CrawlError>;

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Clear crawl data, continuations and every lease except `keep_lease`.
    async fn reset_crawl(&self, keep_lease: &str) -> Result<(), CrawlError>;

    /// Check database connectivity.
    async fn health_check_db(&self) -> Result<bool, CrawlError>;
}

/// Open the backend matching the URL scheme and run its migrations.
///
/// `postgres://` and `postgresql://` select PostgreSQL; `sqlite:` selects SQLite.
pub async fn connect(database_url: &str) -> Result<Arc<dyn Persistence>, CrawlError> {
    if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await
            .map_err(|e| CrawlError::database("connect", e))?;
        crate::migrations::run_postgres(&pool).await?;
        info!(backend = "postgres", "Database connection established");
        Ok(Arc::new(PostgresPersistence::new(pool)))
    } else if database_url.starts_with("sqlite:") {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .map_err(|e| CrawlError::database("connect", e))?;
        crate::migrations::run_sqlite(&pool).await?;
        info!(backend = "sqlite", "Database connection established");
        Ok(Arc::new(SqlitePersistence::new(pool)))
    } else {
        Err(CrawlError::database(
            "connect",
            format!("unsupported database URL scheme: {}", redact(database_url)),
        ))
    }
}

fn redact(url: &str) -> &str {
    url.split_once("://").map(|(scheme, _)| scheme).unwrap_or(url)
}
