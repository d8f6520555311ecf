// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed persistence implementation.
//!
//! Lease acquisition serializes on a transaction-scoped advisory lock so the
//! expired-lease sweep, the live count and the insert act as one unit across
//! every process sharing the database.

use sqlx::PgPool;

use crate::error::CrawlError;

use super::{CommitRecord, ContinuationRecord, LeaseRecord, Persistence, RepositoryRecord};

/// Advisory lock key guarding the lease table.
const LEASE_LOCK_KEY: i64 = 0x7265_706f_6772_6170;

/// PostgreSQL-backed persistence implementation.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new Postgres-backed persistence implementation.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Persistence for PostgresPersistence {
    async fn upsert_repository(&self, repo: &RepositoryRecord) -> Result<(), CrawlError> {
        sqlx::query(
            r#"
            INSERT INTO repositories (
                id, owner_login, owner_id, name, full_name, language,
                forks_count, stargazers_count, watchers_count, subscribers_count, size,
                has_issues, has_wiki, has_pages, has_downloads,
                pushed_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (id) DO UPDATE SET
                owner_login = EXCLUDED.owner_login,
                owner_id = EXCLUDED.owner_id,
                name = EXCLUDED.name,
                full_name = EXCLUDED.full_name,
                language = EXCLUDED.language,
                forks_count = EXCLUDED.forks_count,
                stargazers_count = EXCLUDED.stargazers_count,
                watchers_count = EXCLUDED.watchers_count,
                subscribers_count = EXCLUDED.subscribers_count,
                size = EXCLUDED.size,
                has_issues = EXCLUDED.has_issues,
                has_wiki = EXCLUDED.has_wiki,
                has_pages = EXCLUDED.has_pages,
                has_downloads = EXCLUDED.has_downloads,
                pushed_at = EXCLUDED.pushed_at,
                created_at = EXCLUDED.created_at,
                updated_at = EXCLUDED.updated_at
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
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (sha) DO NOTHING
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
            WHERE id = $1
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
            WHERE sha = $1
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
            INSERT INTO continuation_tasks (id, discriminator, payload, created_at)
            VALUES ($1, $2, $3, NOW())
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
        let record = sqlx::query_as::<_, ContinuationRecord>(
            r#"
            DELETE FROM continuation_tasks
            WHERE id = (
                SELECT id FROM continuation_tasks
                ORDER BY seq
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
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
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(LEASE_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM execution_leases WHERE expires_at <= $1")
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
            VALUES ($1, $2, $3)
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
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(LEASE_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            "UPDATE execution_leases SET expires_at = $1 WHERE id = $2 AND expires_at > $3",
        )
        .bind(expires_at_ms)
        .bind(id)
        .bind(now_ms)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_lease(&self, id: &str) -> Result<bool, CrawlError> {
        let result = sqlx::query("DELETE FROM execution_leases WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_leases(&self, now_ms: i64) -> Result<u64, CrawlError> {
        let result = sqlx::query("DELETE FROM execution_leases WHERE expires_at <= $1")
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

        sqlx::query("TRUNCATE commits, repositories, continuation_tasks")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM execution_leases WHERE id <> $1")
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
