// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Response payloads of the platform REST API.
//!
//! Only the fields the crawler stores are modelled. Everything the platform
//! may omit is optional or defaulted so that sparse payloads (the repository
//! listing endpoint returns a reduced object) still decode.

use serde::{Deserialize, Serialize};

/// `GET /rate_limit` response.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitResponse {
    /// Core API limits.
    pub rate: RateLimit,
}

/// One rate limit window.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimit {
    /// Requests allowed per window.
    #[serde(default)]
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Window reset time, epoch seconds.
    #[serde(default)]
    pub reset: i64,
}

/// Account reference embedded in repositories and commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Login name.
    pub login: String,
    /// Platform id.
    pub id: i64,
}

/// Repository object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryPayload {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub owner: Option<Account>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub forks_count: Option<i64>,
    #[serde(default)]
    pub stargazers_count: Option<i64>,
    #[serde(default)]
    pub watchers_count: Option<i64>,
    #[serde(default)]
    pub subscribers_count: Option<i64>,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub has_issues: Option<bool>,
    #[serde(default)]
    pub has_wiki: Option<bool>,
    #[serde(default)]
    pub has_pages: Option<bool>,
    #[serde(default)]
    pub has_downloads: Option<bool>,
    #[serde(default)]
    pub pushed_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Git-level identity (name, email, date) of an author or committer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitActor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

/// The git object nested in a commit payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitCommit {
    #[serde(default)]
    pub author: Option<GitActor>,
    #[serde(default)]
    pub committer: Option<GitActor>,
}

/// Line-change totals of a commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStats {
    #[serde(default)]
    pub additions: i64,
    #[serde(default)]
    pub deletions: i64,
    #[serde(default)]
    pub total: i64,
}

/// One file touched by a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitFile {
    pub filename: String,
    #[serde(default)]
    pub additions: i64,
    #[serde(default)]
    pub deletions: i64,
    #[serde(default)]
    pub changes: i64,
}

/// Commit object, as listed or as fetched individually.
///
/// `stats` and `files` are only present on the single-commit endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitPayload {
    pub sha: String,
    pub commit: GitCommit,
    #[serde(default)]
    pub author: Option<Account>,
    #[serde(default)]
    pub committer: Option<Account>,
    #[serde(default)]
    pub stats: Option<CommitStats>,
    #[serde(default)]
    pub files: Option<Vec<CommitFile>>,
}

/// One page of a repository's commit listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitPage {
    /// Commits on this page.
    pub commits: Vec<CommitPayload>,
    /// Cursor of the following page, `None` on the last page.
    pub next: Option<String>,
}
