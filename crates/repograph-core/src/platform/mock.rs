// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock platform for testing.
//!
//! Serves a scripted repository/commit graph from memory and records every
//! call it receives, so tests can assert on the exact call sequence.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use repograph_http::{
    Account, CommitFile, CommitPage, CommitPayload, CommitStats, GitActor, GitCommit, HttpError,
    RepositoryPayload,
};
use tokio::sync::{Mutex, MutexGuard};

use super::RemotePlatform;
use crate::error::CrawlError;

/// A call received by [`MockPlatform`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlatformCall {
    /// `remaining_calls`
    RemainingCalls,
    /// `list_repositories`
    ListRepositories {
        /// Requested start id.
        start_id: i64,
    },
    /// `list_commits`
    ListCommits {
        /// Repository.
        full_name: String,
        /// Requested cursor.
        page: Option<String>,
    },
    /// `get_commit`
    GetCommit {
        /// Repository.
        full_name: String,
        /// Commit hash.
        sha: String,
    },
}

impl PlatformCall {
    /// Whether the call costs budget.
    pub fn is_charged(&self) -> bool {
        !matches!(self, PlatformCall::RemainingCalls)
    }
}

#[derive(Default)]
struct MockState {
    remaining: u32,
    repos_per_page: usize,
    commits_per_page: usize,
    repositories: BTreeMap<i64, RepositoryPayload>,
    commits: HashMap<String, Vec<String>>,
    gone: HashSet<String>,
    failures: HashSet<PlatformCall>,
    calls: Vec<PlatformCall>,
}

/// Scripted in-memory platform.
pub struct MockPlatform {
    state: Mutex<MockState>,
    latency: Duration,
}

impl MockPlatform {
    /// A platform reporting `remaining` calls and holding no repositories.
    pub fn new(remaining: u32) -> Self {
        Self {
            state: Mutex::new(MockState {
                remaining,
                repos_per_page: 100,
                commits_per_page: 100,
                ..MockState::default()
            }),
            latency: Duration::ZERO,
        }
    }

    /// Full name the mock assigns to repository `id`.
    pub fn full_name(id: i64) -> String {
        format!("octo/repo-{}", id)
    }

    /// Add repositories with the given ids.
    pub fn with_repositories(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        let state = self.state.get_mut();
        for id in ids {
            state.repositories.insert(id, repository_payload(id));
        }
        self
    }

    /// Set the commits listed for repository `id`, newest first.
    pub fn with_commits<S: Into<String>>(
        mut self,
        id: i64,
        shas: impl IntoIterator<Item = S>,
    ) -> Self {
        let shas = shas.into_iter().map(Into::into).collect();
        self.state.get_mut().commits.insert(Self::full_name(id), shas);
        self
    }

    /// Repositories per listing page.
    pub fn repos_per_page(mut self, n: usize) -> Self {
        self.state.get_mut().repos_per_page = n.max(1);
        self
    }

    /// Commits per listing page.
    pub fn commits_per_page(mut self, n: usize) -> Self {
        self.state.get_mut().commits_per_page = n.max(1);
        self
    }

    /// Make `get_commit` report `sha` as gone.
    pub fn with_gone_commit(mut self, sha: impl Into<String>) -> Self {
        self.state.get_mut().gone.insert(sha.into());
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every occurrence of `call` with a server error.
    pub fn failing_on(mut self, call: PlatformCall) -> Self {
        self.state.get_mut().failures.insert(call);
        self
    }

    /// Stop failing `call`.
    pub async fn heal(&self, call: &PlatformCall) {
        self.state.lock().await.failures.remove(call);
    }

    /// Set the reported remaining-call count.
    pub async fn set_remaining(&self, remaining: u32) {
        self.state.lock().await.remaining = remaining;
    }

    /// Every call received, in order.
    pub async fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().await.calls.clone()
    }

    /// Calls that cost budget, in order.
    pub async fn charged_calls(&self) -> Vec<PlatformCall> {
        self.calls()
            .await
            .into_iter()
            .filter(PlatformCall::is_charged)
            .collect()
    }

    /// Forget recorded calls.
    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    async fn record(&self, call: PlatformCall) -> Result<MutexGuard<'_, MockState>, CrawlError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut state = self.state.lock().await;
        state.calls.push(call.clone());
        if state.failures.contains(&call) {
            return Err(CrawlError::Platform(HttpError::Status {
                status: 502,
                url: format!("mock://{:?}", call),
                message: "scripted failure".to_string(),
            }));
        }
        Ok(state)
    }
}

#[async_trait]
impl RemotePlatform for MockPlatform {
    async fn remaining_calls(&self) -> Result<u32, CrawlError> {
        let state = self.record(PlatformCall::RemainingCalls).await?;
        Ok(state.remaining)
    }

    async fn list_repositories(&self, start_id: i64) -> Result<Vec<RepositoryPayload>, CrawlError> {
        let state = self
            .record(PlatformCall::ListRepositories { start_id })
            .await?;
        Ok(state
            .repositories
            .range(start_id..)
            .take(state.repos_per_page)
            .map(|(_, repo)| repo.clone())
            .collect())
    }

    async fn list_commits(
        &self,
        full_name: &str,
        page: Option<&str>,
    ) -> Result<CommitPage, CrawlError> {
        let state = self
            .record(PlatformCall::ListCommits {
                full_name: full_name.to_string(),
                page: page.map(str::to_string),
            })
            .await?;

        let number: usize = page.and_then(|p| p.parse().ok()).unwrap_or(1).max(1);
        let shas = state.commits.get(full_name).map(Vec::as_slice).unwrap_or_default();
        let from = (number - 1) * state.commits_per_page;
        let to = (from + state.commits_per_page).min(shas.len());

        let commits = shas
            .get(from..to)
            .unwrap_or_default()
            .iter()
            .map(|sha| listed_commit(sha))
            .collect();
        let next = (to < shas.len()).then(|| (number + 1).to_string());

        Ok(CommitPage { commits, next })
    }

    async fn get_commit(
        &self,
        full_name: &str,
        sha: &str,
    ) -> Result<Option<CommitPayload>, CrawlError> {
        let state = self
            .record(PlatformCall::GetCommit {
                full_name: full_name.to_string(),
                sha: sha.to_string(),
            })
            .await?;

        if state.gone.contains(sha) {
            return Ok(None);
        }

        let mut commit = listed_commit(sha);
        commit.stats = Some(CommitStats {
            additions: 5,
            deletions: 2,
            total: 7,
        });
        commit.files = Some(vec![
            CommitFile {
                filename: "src/lib.rs".to_string(),
                additions: 3,
                deletions: 1,
                changes: 4,
            },
            CommitFile {
                filename: "tests/integration.rs".to_string(),
                additions: 2,
                deletions: 1,
                changes: 3,
            },
        ]);
        Ok(Some(commit))
    }
}

fn repository_payload(id: i64) -> RepositoryPayload {
    RepositoryPayload {
        id,
        name: format!("repo-{}", id),
        full_name: MockPlatform::full_name(id),
        owner: Some(Account {
            login: "octo".to_string(),
            id: 1,
        }),
        language: Some("Rust".to_string()),
        forks_count: Some(id % 7),
        stargazers_count: Some(id % 11),
        watchers_count: Some(id % 11),
        subscribers_count: Some(1),
        size: Some(128),
        has_issues: Some(true),
        has_wiki: Some(false),
        has_pages: Some(false),
        has_downloads: Some(true),
        pushed_at: Some("2020-01-01T00:00:00Z".to_string()),
        created_at: Some("2019-06-01T12:00:00Z".to_string()),
        updated_at: None,
    }
}

fn listed_commit(sha: &str) -> CommitPayload {
    let actor = GitActor {
        name: Some("Ada Lovelace".to_string()),
        email: Some("ada@example.com".to_string()),
        date: Some("2020-01-01T00:00:00Z".to_string()),
    };
    CommitPayload {
        sha: sha.to_string(),
        commit: GitCommit {
            author: Some(actor.clone()),
            committer: Some(actor),
        },
        author: Some(Account {
            login: "ada".to_string(),
            id: 7,
        }),
        committer: None,
        stats: None,
        files: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_repository_paging() {
        let platform = MockPlatform::new(10)
            .with_repositories([3, 1, 7, 5])
            .repos_per_page(2);

        let first = platform.list_repositories(0).await.unwrap();
        assert_eq!(first.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 3]);

        let second = platform.list_repositories(4).await.unwrap();
        assert_eq!(second.iter().map(|r| r.id).collect::<Vec<_>>(), vec![5, 7]);

        assert!(platform.list_repositories(8).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_paging() {
        let platform = MockPlatform::new(10)
            .with_commits(1, ["a", "b", "c"])
            .commits_per_page(2);
        let name = MockPlatform::full_name(1);

        let first = platform.list_commits(&name, None).await.unwrap();
        assert_eq!(first.commits.len(), 2);
        assert_eq!(first.next.as_deref(), Some("2"));

        let second = platform.list_commits(&name, Some("2")).await.unwrap();
        assert_eq!(second.commits[0].sha, "c");
        assert_eq!(second.next, None);

        let unknown = platform.list_commits("octo/none", None).await.unwrap();
        assert_eq!(unknown, CommitPage::default());
    }

    #[tokio::test]
    async fn test_records_calls_and_failures() {
        let failing = PlatformCall::ListRepositories { start_id: 2 };
        let platform = MockPlatform::new(42).failing_on(failing.clone());

        assert_eq!(platform.remaining_calls().await.unwrap(), 42);
        assert!(platform.list_repositories(2).await.is_err());
        platform.heal(&failing).await;
        assert!(platform.list_repositories(2).await.is_ok());

        assert_eq!(platform.calls().await.len(), 3);
        assert_eq!(platform.charged_calls().await, vec![failing.clone(), failing]);
    }

    #[tokio::test]
    async fn test_gone_commit() {
        let platform = MockPlatform::new(1).with_gone_commit("dead");
        assert!(platform.get_commit("octo/repo-1", "dead").await.unwrap().is_none());
        let live = platform.get_commit("octo/repo-1", "beef").await.unwrap().unwrap();
        assert_eq!(live.stats.unwrap().total, 7);
    }
}
