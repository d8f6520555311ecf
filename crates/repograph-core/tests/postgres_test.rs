// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL backend tests.
//!
//! Run with a database:
//!     TEST_DATABASE_URL=postgres://localhost/repograph_test cargo test -p repograph-core --test postgres_test
//!
//! The steps share one database and run inside a single test so they do not
//! race each other on the lease and continuation tables.

use std::sync::Arc;

use repograph_core::persistence::{self, CommitRecord, LeaseRecord, Persistence, RepositoryRecord};

macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        }
    };
}

async fn get_test_persistence() -> Option<Arc<dyn Persistence>> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    persistence::connect(&url).await.ok()
}

fn repository(id: i64, stars: i64) -> RepositoryRecord {
    RepositoryRecord {
        id,
        owner_login: Some("octo".to_string()),
        owner_id: Some(1),
        name: format!("r{}", id),
        full_name: format!("octo/r{}", id),
        language: None,
        forks_count: 0,
        stargazers_count: stars,
        watchers_count: 0,
        subscribers_count: 0,
        size: 0,
        has_issues: true,
        has_wiki: true,
        has_pages: false,
        has_downloads: false,
        pushed_at: None,
        created_at: Some(1_577_836_800_000),
        updated_at: None,
    }
}

fn commit(sha: &str, repo_id: i64, additions: i64) -> CommitRecord {
    CommitRecord {
        sha: sha.to_string(),
        repo_id,
        author_name: Some("Ada".to_string()),
        author_email: Some("ada@example.com".to_string()),
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
async fn test_postgres_backend() {
    skip_if_no_db!();
    let Some(db) = get_test_persistence().await else {
        eprintln!("Skipping test: could not connect to TEST_DATABASE_URL");
        return;
    };

    db.reset_crawl("").await.unwrap();
    assert!(db.health_check_db().await.unwrap());

    // Repositories are overwritten.
    db.upsert_repository(&repository(1, 5)).await.unwrap();
    db.upsert_repository(&repository(1, 9)).await.unwrap();
    assert_eq!(db.count_repositories().await.unwrap(), 1);
    let stored = db.get_repository(1).await.unwrap().unwrap();
    assert_eq!(stored.stargazers_count, 9);
    assert_eq!(stored.created_at, Some(1_577_836_800_000));

    // Commits keep the first row.
    let sha = "a".repeat(40);
    assert!(db.insert_commit(&commit(&sha, 1, 3)).await.unwrap());
    assert!(!db.insert_commit(&commit(&sha, 1, 99)).await.unwrap());
    assert_eq!(db.get_commit(&sha).await.unwrap().unwrap().additions, 3);
    assert_eq!(db.count_commits().await.unwrap(), 1);

    // Continuations come back oldest first, once.
    db.insert_continuation("c-1", "ScanRepositories", "{\"n\":1}")
        .await
        .unwrap();
    db.insert_continuation("c-2", "FetchCommits", "{\"n\":2}")
        .await
        .unwrap();
    let first = db.take_oldest_continuation().await.unwrap().unwrap();
    assert_eq!(first.id, "c-1");
    assert_eq!(first.payload, "{\"n\":1}");
    let second = db.take_oldest_continuation().await.unwrap().unwrap();
    assert_eq!(second.discriminator, "FetchCommits");
    assert!(db.take_oldest_continuation().await.unwrap().is_none());

    // Lease ceiling, with expired leases not counting.
    let now = 1_000_000;
    assert!(db.try_insert_lease(&lease("l-1", now, now + 100), 2, now).await.unwrap());
    assert!(db.try_insert_lease(&lease("l-2", now, now + 100), 2, now).await.unwrap());
    assert!(!db.try_insert_lease(&lease("l-3", now, now + 100), 2, now).await.unwrap());
    // Renewal keeps l-1 alive past its original expiry.
    assert!(db.renew_lease("l-1", now + 500, now + 50).await.unwrap());
    let later = now + 101;
    assert!(db.try_insert_lease(&lease("l-3", later, later + 100), 2, later).await.unwrap());
    assert_eq!(db.count_leases().await.unwrap(), 2);
    assert!(!db.renew_lease("l-2", later + 500, later).await.unwrap());

    assert!(db.delete_lease("l-1").await.unwrap());
    assert!(db.delete_lease("l-3").await.unwrap());
    assert!(!db.delete_lease("l-3").await.unwrap());

    // Reset keeps only the named lease.
    db.try_insert_lease(&lease("keep", later, later + 100), 2, later)
        .await
        .unwrap();
    db.try_insert_lease(&lease("drop", later, later + 100), 2, later)
        .await
        .unwrap();
    db.reset_crawl("keep").await.unwrap();
    assert_eq!(db.count_repositories().await.unwrap(), 0);
    assert_eq!(db.count_commits().await.unwrap(), 0);
    assert_eq!(db.count_leases().await.unwrap(), 1);

    db.reset_crawl("").await.unwrap();
}
