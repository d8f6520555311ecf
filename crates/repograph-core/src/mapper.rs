// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Platform payload to row mapping.

use chrono::DateTime;
use repograph_http::{CommitFile, CommitPayload, GitActor, RepositoryPayload};

use crate::persistence::{CommitRecord, RepositoryRecord};

const TEST_DIRECTORIES: &[&str] = &["test", "tests", "spec", "specs", "__tests__"];

/// Map a listed repository to its row.
pub fn repository_record(payload: &RepositoryPayload) -> RepositoryRecord {
    RepositoryRecord {
        id: payload.id,
        owner_login: payload.owner.as_ref().map(|o| o.login.clone()),
        owner_id: payload.owner.as_ref().map(|o| o.id),
        name: payload.name.clone(),
        full_name: payload.full_name.clone(),
        language: payload.language.clone(),
        forks_count: payload.forks_count.unwrap_or(0),
        stargazers_count: payload.stargazers_count.unwrap_or(0),
        watchers_count: payload.watchers_count.unwrap_or(0),
        subscribers_count: payload.subscribers_count.unwrap_or(0),
        size: payload.size.unwrap_or(0),
        has_issues: payload.has_issues.unwrap_or(false),
        has_wiki: payload.has_wiki.unwrap_or(false),
        has_pages: payload.has_pages.unwrap_or(false),
        has_downloads: payload.has_downloads.unwrap_or(false),
        pushed_at: epoch_millis(payload.pushed_at.as_deref()),
        created_at: epoch_millis(payload.created_at.as_deref()),
        updated_at: epoch_millis(payload.updated_at.as_deref()),
    }
}

/// Map a commit payload to its row.
///
/// Line counters come from `stats`; the test subset is summed over `files`.
/// Listed (not hydrated) commits carry neither, so their counters are 0.
pub fn commit_record(repo_id: i64, payload: &CommitPayload) -> CommitRecord {
    let author = payload.commit.author.as_ref();
    let committer = payload.commit.committer.as_ref();
    let stats = payload.stats.unwrap_or_default();
    let (test_additions, test_deletions, test_changes) = payload
        .files
        .as_deref()
        .map(test_counters)
        .unwrap_or((0, 0, 0));

    CommitRecord {
        sha: payload.sha.clone(),
        repo_id,
        author_name: author.and_then(|a| a.name.clone()),
        author_email: author.and_then(|a| a.email.clone()),
        author_date: actor_date(author),
        committer_name: committer.and_then(|c| c.name.clone()),
        committer_email: committer.and_then(|c| c.email.clone()),
        committer_date: actor_date(committer),
        author_login: payload.author.as_ref().map(|a| a.login.clone()),
        author_id: payload.author.as_ref().map(|a| a.id),
        committer_login: payload.committer.as_ref().map(|c| c.login.clone()),
        committer_id: payload.committer.as_ref().map(|c| c.id),
        additions: stats.additions,
        deletions: stats.deletions,
        total: stats.total,
        test_additions,
        test_deletions,
        test_changes,
    }
}

/// Whether a repository-relative path looks like test code.
pub fn is_test_path(path: &str) -> bool {
    let mut parts = path.rsplit('/');
    let file = parts.next().unwrap_or_default().to_ascii_lowercase();
    if file.contains("test") || file.contains("spec") {
        return true;
    }
    parts.any(|dir| TEST_DIRECTORIES.contains(&dir.to_ascii_lowercase().as_str()))
}

fn test_counters(files: &[CommitFile]) -> (i64, i64, i64) {
    files
        .iter()
        .filter(|f| is_test_path(&f.filename))
        .fold((0, 0, 0), |(a, d, c), f| {
            (a + f.additions, d + f.deletions, c + f.changes)
        })
}

fn actor_date(actor: Option<&GitActor>) -> Option<i64> {
    epoch_millis(actor.and_then(|a| a.date.as_deref()))
}

fn epoch_millis(timestamp: Option<&str>) -> Option<i64> {
    timestamp
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use repograph_http::{Account, CommitStats, GitCommit};

    fn payload() -> CommitPayload {
        CommitPayload {
            sha: "a".repeat(40),
            commit: GitCommit {
                author: Some(GitActor {
                    name: Some("Ada".into()),
                    email: Some("ada@example.com".into()),
                    date: Some("2020-01-01T00:00:00Z".into()),
                }),
                committer: None,
            },
            author: Some(Account {
                login: "ada".into(),
                id: 7,
            }),
            committer: None,
            stats: None,
            files: None,
        }
    }

    fn file(name: &str, additions: i64, deletions: i64) -> CommitFile {
        CommitFile {
            filename: name.into(),
            additions,
            deletions,
            changes: additions + deletions,
        }
    }

    #[test]
    fn test_is_test_path() {
        assert!(is_test_path("tests/integration.rs"));
        assert!(is_test_path("src/__tests__/app.js"));
        assert!(is_test_path("pkg/spec/model.rb"));
        assert!(is_test_path("src/parser_test.go"));
        assert!(is_test_path("src/Parser.Spec.ts"));
        assert!(!is_test_path("src/lib.rs"));
        assert!(!is_test_path("docs/testing-guide/index.md"));
        assert!(!is_test_path("contest/main.c"));
    }

    #[test]
    fn test_listed_commit_has_zero_counters() {
        let record = commit_record(3, &payload());

        assert_eq!(record.repo_id, 3);
        assert_eq!(record.author_name.as_deref(), Some("Ada"));
        assert_eq!(record.author_date, Some(1_577_836_800_000));
        assert_eq!(record.author_login.as_deref(), Some("ada"));
        assert_eq!(record.committer_name, None);
        assert_eq!(record.committer_date, None);
        assert_eq!((record.additions, record.total, record.test_changes), (0, 0, 0));
    }

    #[test]
    fn test_hydrated_commit_counters() {
        let mut commit = payload();
        commit.stats = Some(CommitStats {
            additions: 15,
            deletions: 4,
            total: 19,
        });
        commit.files = Some(vec![
            file("src/lib.rs", 5, 2),
            file("tests/api.rs", 8, 1),
            file("src/util_test.go", 2, 1),
        ]);

        let record = commit_record(1, &commit);
        assert_eq!((record.additions, record.deletions, record.total), (15, 4, 19));
        assert_eq!(record.test_additions, 10);
        assert_eq!(record.test_deletions, 2);
        assert_eq!(record.test_changes, 12);
    }

    #[test]
    fn test_repository_defaults() {
        let payload: RepositoryPayload = serde_json::from_value(serde_json::json!({
            "id": 42,
            "name": "r",
            "full_name": "o/r",
            "owner": {"login": "o", "id": 9},
            "stargazers_count": 3,
            "has_issues": true,
            "pushed_at": "2020-01-01T00:00:01+00:00",
            "created_at": "not a date"
        }))
        .unwrap();

        let record = repository_record(&payload);
        assert_eq!(record.owner_login.as_deref(), Some("o"));
        assert_eq!(record.owner_id, Some(9));
        assert_eq!(record.stargazers_count, 3);
        assert_eq!(record.forks_count, 0);
        assert!(record.has_issues);
        assert!(!record.has_wiki);
        assert_eq!(record.pushed_at, Some(1_577_836_801_000));
        assert_eq!(record.created_at, None);
    }
}
