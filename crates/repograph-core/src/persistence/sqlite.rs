//! SQLite-backed persistence implementation.
//!
//! Lease acquisition relies on SQLite's single-writer transactions; the pool
//! opened by [`super::connect`] holds one connection.

use std::path::Path;

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::CrawlError;

use super::{CommitRecord, ContinuationRecord, LeaseRecord, Persistence, RepositoryRecord};

/// SQLite-backed persistence provider.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Create a new SQLite persistence provider from an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) a database file and run all migrations.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CrawlError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                CrawlError::database(
                    "create_dir",
                    format!("Failed to create directory {:?}: {}", parent, e),
                )
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .map_err(|e| {
                CrawlError::database(
                    "connect",
                    format!("Failed to connect to SQLite at {:?}: {}", path, e),
                )
            })?;

        crate::migrations::run_sqlite(&pool).await?;

        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl Persistence for SqlitePersistence {
    async fn upsert_repository(&self, repo: &RepositoryRecord) -> Result<(), CrawlError> {
        sqlx::query(
            r#"
            INSERT INTO repositories (
                id, owner_login, owner_id, name, full_name, language,
                forks_count, stargazers_count, watchers_count, subscribers_count, size,
                has_issues, has_wiki, has_pages, has_downloads,
                pushed_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                owner_login = excluded.owner_login,
                owner_id = excluded.owner_id,
                name = excluded.name,
                full_name = excluded.full_name,
                language = excluded.language,
                forks_count = excluded.forks_count,
                stargazers_count = excluded.stargazers_count,
                watchers_count = excluded.watchers_count,
                subscribers_count = excluded.subscribers_count,
                size = excluded.size,
                has_issues = excluded.has_issues,
                has_wiki = excluded.has_wiki,
                has_pages = excluded.has_pages,
                has_downloads = excluded.has_downloads,
                pushed_at = excluded.pushed_at,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(repo.id)
        .bind(&repo.owner_login)
        .bind(repo.owner_id)
        .bind(&repo.name)
        .bind(&repo.full_name)
        .bind(&repo.language)
        .bind(repo.forks_count)
        .bind(repo.stargazers_count)
        .bind(repo.watchers_count)
        .bind(repo.subscribers_count)
        .bind(repo.size)
        .bind(repo.has_issues)
        .bind(repo.has_wiki)
        .bind(repo.has_pages)
        .bind(repo.has_downloads)
        .bind(repo.pushed_at)
        .bind(repo.created_at)
        .bind(repo.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_commit(&self, commit: &CommitRecord) -> Result<bool, CrawlError> {
        let result = sqlx::query(
            r#"
            INSERT INTO commits (
                sha, repo_id,
                author_name, author_email, author_date,
                committer_name, committer_email, committer_date,
                author_login, author_id, committer_login, committer_id,
                additions, deletions, total,
                test_additions, test_deletions, test_changes
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(sha) DO NOTHING
            "#,
        )
        .bind(&commit.sha)
        .bind(commit.repo_id)
        .bind(&commit.author_name)
        .bind(&commit.author_email)
        .bind(commit.author_date)
        .bind(&commit.committer_name)
        .bind(&commit.committer_email)
        .bind(commit.committer_date)
        .bind(&commit.author_login)
        .bind(commit.author_id)
        .bind(&commit.committer_login)
        .bind(commit.committer_id)
        .bind(commit.additions)
        .bind(commit.deletions)
        .bind(commit.total)
        .bind(commit.test_additions)
        .bind(commit.test_deletions)
        .bind(commit.test_changes)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_repository(&self, id: i64) -> Result<Option<RepositoryRecord>, CrawlError> {
        let record = sqlx::query_as::<_, RepositoryRecord>(
            r#"
            SELECT id, owner_login, owner_id, name, full_name, language,
                   forks_count, stargazers_count, watchers_count, subscribers_count, size,
                   has_issues, has_wiki, has_pages, has_downloads,
                   pushed_at, created_at, updated_at
            FROM repositories
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_commit(&self, sha: &str) -> Result<Option<CommitRecord>, CrawlError> {
        let record = sqlx::query_as::<_, CommitRecord>(
            r#"
            SELECT sha, repo_id,
                   author_name, author_email, author_date,
                   committer_name, committer_email, committer_date,
                   author_login, author_id, committer_login, committer_id,
                   additions, deletions, total,
                   test_additions, test_deletions, test_changes
            FROM commits
            WHERE sha = ?
            "#,
        )
        .bind(sha)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn count_repositories(&self) -> Result<i64, CrawlError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM repositories")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_commits(&self) -> Result<i64, CrawlError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM commits")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn insert_continuation(
        &self,
        id: &str,
        discriminator: &str,
        payload: &str,
    ) -> Result<(), CrawlError> {
        sqlx::query(
            r#"
            INSERT INTO continuation_tasks (id, discriminator, payload)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(discriminator)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn take_oldest_continuation(&self) -> Result<Option<ContinuationRecord>, CrawlError> {
        // A single DELETE ... RETURNING statement: two takers never see the same row.
        let record = sqlx::query_as::<_, ContinuationRecord>(
            r#"
            DELETE FROM continuation_tasks
            WHERE seq = (SELECT seq FROM continuation_tasks ORDER BY seq LIMIT 1)
            RETURNING id, discriminator, payload
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn count_continuations(&self) -> Result<i64, CrawlError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM continuation_tasks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn try_insert_lease(
        &self,
        lease: &LeaseRecord,
        ceiling: u32,
        now_ms: i64,
    ) -> Result<bool, CrawlError> {
        // The sweep is the first statement, so the transaction holds the
        // database write lock before it counts. Other handles on the same file
        // wait on the busy timeout until this one commits.
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM execution_leases WHERE expires_at <= ?")
            .bind(now_ms)
            .execute(&mut *tx)
            .await?;

        let live: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM execution_leases")
            .fetch_one(&mut *tx)
            .await?;

        if live >= i64::from(ceiling) {
            tx.commit().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO execution_leases (id, acquired_at, expires_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&lease.id)
        .bind(lease.acquired_at)
        .bind(lease.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn renew_lease(
        &self,
        id: &str,
        expires_at_ms: i64,
        now_ms: i64,
    ) -> Result<bool, CrawlError> {
        let result = sqlx::query(
            "UPDATE execution_leases SET expires_at = ? WHERE id = ? AND expires_at > ?",
        )
        .bind(expires_at_ms)
        .bind(id)
        .bind(now_ms)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_lease(&self, id: &str) -> Result<bool, CrawlError> {
        let result = sqlx::query("DELETE FROM execution_leases WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_leases(&self, now_ms: i64) -> Result<u64, CrawlError> {
        let result = sqlx::query("DELETE FROM execution_leases WHERE expires_at <= ?")
            .bind(now_ms)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn count_leases(&self) -> Result<i64, CrawlError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM execution_leases")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn reset_crawl(&self, keep_lease: &str) -> Result<(), CrawlError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM commits").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM repositories")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM continuation_tasks")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM execution_leases WHERE id <> ?")
            .bind(keep_lease)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn health_check_db(&self) -> Result<bool, CrawlError> {
        let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(row.0 == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");

        crate::migrations::run_sqlite(&pool)
            .await
            .expect("Failed to run migrations");

        pool
    }

    fn repository(id: i64, stars: i64) -> RepositoryRecord {
        RepositoryRecord {
            id,
            owner_login: Some("octo".to_string()),
            owner_id: Some(1),
            name: format!("r{}", id),
            full_name: format!("octo/r{}", id),
            language: Some("Rust".to_string()),
            forks_count: 0,
            stargazers_count: stars,
            watchers_count: 0,
            subscribers_count: 0,
            size: 10,
            has_issues: true,
            has_wiki: false,
            has_pages: false,
            has_downloads: true,
            pushed_at: Some(1_577_836_800_000),
            created_at: None,
            updated_at: None,
        }
    }

    fn commit(sha: &str, repo_id: i64, additions: i64) -> CommitRecord {
        CommitRecord {
            sha: sha.to_string(),
            repo_id,
            author_name: Some("Ada".to_string()),
            author_email: None,
            author_date: Some(1_577_836_800_000),
            committer_name: None,
            committer_email: None,
            committer_date: None,
            author_login: None,
            author_id: None,
            committer_login: None,
            committer_id: None,
            additions,
            deletions: 0,
            total: additions,
            test_additions: 0,
            test_deletions: 0,
            test_changes: 0,
        }
    }

    fn lease(id: &str, acquired_at: i64, expires_at: i64) -> LeaseRecord {
        LeaseRecord {
            id: id.to_string(),
            acquired_at,
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_upsert_repository_overwrites() {
        let persistence = SqlitePersistence::new(test_pool().await);

        persistence.upsert_repository(&repository(5, 1)).await.unwrap();
        persistence.upsert_repository(&repository(5, 9)).await.unwrap();

        assert_eq!(persistence.count_repositories().await.unwrap(), 1);
        let stored = persistence.get_repository(5).await.unwrap().unwrap();
        assert_eq!(stored.stargazers_count, 9);
        assert!(stored.has_issues);
        assert!(!stored.has_wiki);
    }

    #[tokio::test]
    async fn test_insert_commit_keeps_first_row() {
        let persistence = SqlitePersistence::new(test_pool().await);

        assert!(persistence.insert_commit(&commit("abc", 1, 3)).await.unwrap());
        assert!(!persistence.insert_commit(&commit("abc", 2, 7)).await.unwrap());

        assert_eq!(persistence.count_commits().await.unwrap(), 1);
        let stored = persistence.get_commit("abc").await.unwrap().unwrap();
        assert_eq!(stored.repo_id, 1);
        assert_eq!(stored.additions, 3);
    }

    #[tokio::test]
    async fn test_take_continuation_is_fifo_and_consuming() {
        let persistence = SqlitePersistence::new(test_pool().await);

        persistence
            .insert_continuation("b", "scan_repositories", "{\"n\":1}")
            .await
            .unwrap();
        persistence
            .insert_continuation("a", "fetch_commits", "{\"n\":2}")
            .await
            .unwrap();

        let first = persistence.take_oldest_continuation().await.unwrap().unwrap();
        assert_eq!(first.id, "b");
        assert_eq!(first.discriminator, "scan_repositories");

        let second = persistence.take_oldest_continuation().await.unwrap().unwrap();
        assert_eq!(second.id, "a");
        assert_eq!(second.payload, "{\"n\":2}");

        assert!(persistence.take_oldest_continuation().await.unwrap().is_none());
        assert_eq!(persistence.count_continuations().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lease_ceiling() {
        let persistence = SqlitePersistence::new(test_pool().await);

        assert!(persistence.try_insert_lease(&lease("a", 0, 1_000), 2, 0).await.unwrap());
        assert!(persistence.try_insert_lease(&lease("b", 0, 1_000), 2, 0).await.unwrap());
        assert!(!persistence.try_insert_lease(&lease("c", 0, 1_000), 2, 0).await.unwrap());
        assert_eq!(persistence.count_leases().await.unwrap(), 2);

        assert!(persistence.delete_lease("a").await.unwrap());
        assert!(!persistence.delete_lease("a").await.unwrap());
        assert!(persistence.try_insert_lease(&lease("c", 0, 1_000), 2, 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_leases_do_not_count() {
        let persistence = SqlitePersistence::new(test_pool().await);

        assert!(persistence.try_insert_lease(&lease("old", 0, 500), 1, 0).await.unwrap());
        assert!(!persistence.try_insert_lease(&lease("new", 400, 1_400), 1, 400).await.unwrap());
        assert!(persistence.try_insert_lease(&lease("new", 600, 1_600), 1, 600).await.unwrap());
        assert_eq!(persistence.count_leases().await.unwrap(), 1);

        assert_eq!(persistence.delete_expired_leases(2_000).await.unwrap(), 1);
        assert_eq!(persistence.count_leases().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_renew_extends_live_lease_only() {
        let persistence = SqlitePersistence::new(test_pool().await);
        persistence.try_insert_lease(&lease("live", 0, 500), 1, 0).await.unwrap();

        assert!(persistence.renew_lease("live", 900, 400).await.unwrap());
        assert!(!persistence.try_insert_lease(&lease("other", 600, 1_600), 1, 600).await.unwrap());

        // Expired at 1_000: not revived.
        assert!(!persistence.renew_lease("live", 2_000, 1_000).await.unwrap());
        assert!(!persistence.renew_lease("missing", 2_000, 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_crawl_keeps_own_lease() {
        let persistence = SqlitePersistence::new(test_pool().await);

        persistence.upsert_repository(&repository(1, 0)).await.unwrap();
        persistence.insert_commit(&commit("abc", 1, 1)).await.unwrap();
        persistence
            .insert_continuation("t", "fetch_commits", "{}")
            .await
            .unwrap();
        persistence.try_insert_lease(&lease("mine", 0, 10), 5, 0).await.unwrap();
        persistence.try_insert_lease(&lease("other", 0, 10), 5, 0).await.unwrap();

        persistence.reset_crawl("mine").await.unwrap();

        assert_eq!(persistence.count_repositories().await.unwrap(), 0);
        assert_eq!(persistence.count_commits().await.unwrap(), 0);
        assert_eq!(persistence.count_continuations().await.unwrap(), 0);
        assert_eq!(persistence.count_leases().await.unwrap(), 1);
        assert!(!persistence.delete_lease("other").await.unwrap());
        assert!(persistence.delete_lease("mine").await.unwrap());
    }

    #[tokio::test]
    async fn test_from_path_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("crawl.db");

        let persistence = SqlitePersistence::from_path(&path).await.unwrap();
        assert!(persistence.health_check_db().await.unwrap());
        assert!(path.exists());
    }
}
