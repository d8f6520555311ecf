// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Remote platform abstraction.
//!
//! The interpreter only talks to the platform through [`RemotePlatform`].
//! [`GithubPlatform`] adapts the REST client; [`mock::MockPlatform`] serves a
//! scripted in-memory graph for tests.

pub mod mock;

use async_trait::async_trait;
use repograph_http::{ClientConfig, CommitPage, CommitPayload, GithubClient, RepositoryPayload};

use crate::config::PlatformConfig;
use crate::error::CrawlError;

/// Operations the crawl needs from the source-hosting platform.
///
/// Every method except [`RemotePlatform::remaining_calls`] costs one unit of
/// the call budget.
#[async_trait]
pub trait RemotePlatform: Send + Sync {
    /// Calls remaining in the platform's current rate window.
    async fn remaining_calls(&self) -> Result<u32, CrawlError>;

    /// Repositories with id >= `start_id`, ascending. Empty at the end.
    async fn list_repositories(&self, start_id: i64) -> Result<Vec<RepositoryPayload>, CrawlError>;

    /// One page of a repository's commits. `page` is the cursor returned by
    /// the previous page, `None` for the first.
    async fn list_commits(
        &self,
        full_name: &str,
        page: Option<&str>,
    ) -> Result<CommitPage, CrawlError>;

    /// A single commit with stats and files, `None` if it no longer exists.
    async fn get_commit(
        &self,
        full_name: &str,
        sha: &str,
    ) -> Result<Option<CommitPayload>, CrawlError>;
}

/// [`RemotePlatform`] backed by the GitHub REST API.
pub struct GithubPlatform {
    client: GithubClient,
}

impl GithubPlatform {
    /// Wrap an existing client.
    pub fn new(client: GithubClient) -> Self {
        Self { client }
    }

    /// Build a client from configuration.
    pub fn from_config(config: &PlatformConfig) -> Result<Self, CrawlError> {
        let client = GithubClient::new(ClientConfig {
            base_url: config.api_url.clone(),
            token: config.token.clone(),
            commits_per_page: config.commits_per_page,
            max_retries: config.max_retries,
            ..ClientConfig::default()
        })?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl RemotePlatform for GithubPlatform {
    async fn remaining_calls(&self) -> Result<u32, CrawlError> {
        Ok(self.client.rate_remaining().await?)
    }

    async fn list_repositories(&self, start_id: i64) -> Result<Vec<RepositoryPayload>, CrawlError> {
        Ok(self.client.list_repositories(start_id).await?)
    }

    async fn list_commits(
        &self,
        full_name: &str,
        page: Option<&str>,
    ) -> Result<CommitPage, CrawlError> {
        Ok(self.client.list_commits(full_name, page).await?)
    }

    async fn get_commit(
        &self,
        full_name: &str,
        sha: &str,
    ) -> Result<Option<CommitPayload>, CrawlError> {
        Ok(self.client.get_commit(full_name, sha).await?)
    }
}
