// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Platform API client.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, LINK, USER_AGENT};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{HttpError, Result};
use crate::paging::next_page;
use crate::types::{CommitPage, CommitPayload, RateLimitResponse, RepositoryPayload};

/// Settings for [`GithubClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL, without trailing slash.
    pub base_url: String,
    /// Optional bearer token.
    pub token: Option<String>,
    /// Commits requested per listing page (1–100).
    pub commits_per_page: u32,
    /// Retries after a transient failure.
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each further retry.
    pub retry_backoff: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            token: None,
            commits_per_page: 100,
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// REST client for the repository and commit endpoints the crawler walks.
///
/// Every public method issues exactly one logical request (retries of the
/// same request aside), so callers can account for each call against the
/// platform's rate limit.
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl GithubClient {
    /// Build a client.
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.commits_per_page == 0 || config.commits_per_page > 100 {
            return Err(HttpError::Config(format!(
                "commits_per_page must be between 1 and 100, got {}",
                config.commits_per_page
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("repograph"));
        if let Some(token) = &config.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| HttpError::Config(format!("invalid token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| HttpError::Config(e.to_string()))?;

        Ok(Self { http, config })
    }

    /// Client settings.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Calls left in the current rate limit window.
    ///
    /// The rate limit endpoint itself is not counted against the limit.
    pub async fn rate_remaining(&self) -> Result<u32> {
        let url = format!("{}/rate_limit", self.config.base_url);
        let response = self.get(&url, &[]).await?;
        let body: RateLimitResponse = decode(&url, response).await?;
        Ok(body.rate.remaining)
    }

    /// Repositories with an id greater than or equal to `start_id`, ascending.
    pub async fn list_repositories(&self, start_id: i64) -> Result<Vec<RepositoryPayload>> {
        let url = format!("{}/repositories", self.config.base_url);
        // `since` is exclusive
        let since = (start_id - 1).max(0).to_string();
        let response = self.get(&url, &[("since", since)]).await?;
        decode(&url, response).await
    }

    /// One page of a repository's commits.
    ///
    /// `cursor` is the value returned as [`CommitPage::next`] by the previous
    /// page, or `None` for the first page. Repositories that are empty,
    /// deleted or blocked answer with an empty final page.
    pub async fn list_commits(&self, full_name: &str, cursor: Option<&str>) -> Result<CommitPage> {
        let url = format!("{}/repos/{}/commits", self.config.base_url, full_name);
        let page = cursor.unwrap_or("1").to_string();
        let query = [
            ("per_page", self.config.commits_per_page.to_string()),
            ("page", page),
        ];

        let response = match self.get(&url, &query).await {
            Ok(response) => response,
            Err(HttpError::Status { status, .. }) if is_unlistable(status) => {
                debug!(repository = %full_name, status, "Commit listing unavailable, treating as empty");
                return Ok(CommitPage::default());
            }
            Err(e) => return Err(e),
        };

        let next = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(next_page);
        let commits: Vec<CommitPayload> = decode(&url, response).await?;

        Ok(CommitPage { commits, next })
    }

    /// A single commit with stats and files, `None` if it no longer exists.
    pub async fn get_commit(&self, full_name: &str, sha: &str) -> Result<Option<CommitPayload>> {
        let url = format!("{}/repos/{}/commits/{}", self.config.base_url, full_name, sha);
        match self.get(&url, &[]).await {
            Ok(response) => decode(&url, response).await.map(Some),
            Err(HttpError::Status { status, .. }) if status == 404 || status == 422 => {
                debug!(repository = %full_name, sha = %sha, status, "Commit gone");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Response> {
        let mut attempt = 0;
        let mut backoff = self.config.retry_backoff;

        loop {
            let result = self.send_once(url, query).await;
            match result {
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        url = %url,
                        attempt,
                        max_retries = self.config.max_retries,
                        error = %e,
                        "Transient platform failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                other => return other,
            }
        }
    }

    async fn send_once(&self, url: &str, query: &[(&str, String)]) -> Result<Response> {
        let response = self.http.get(url).query(query).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or("").to_string());
        Err(HttpError::Status {
            status: status.as_u16(),
            url: url.to_string(),
            message,
        })
    }
}

fn is_unlistable(status: u16) -> bool {
    status == StatusCode::NOT_FOUND.as_u16()
        || status == StatusCode::CONFLICT.as_u16()
        || status == StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS.as_u16()
}

async fn decode<T: DeserializeOwned>(url: &str, response: Response) -> Result<T> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| HttpError::Malformed {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_page_size_out_of_range() {
        let config = ClientConfig {
            commits_per_page: 0,
            ..Default::default()
        };
        assert!(matches!(GithubClient::new(config), Err(HttpError::Config(_))));

        let config = ClientConfig {
            commits_per_page: 101,
            ..Default::default()
        };
        assert!(matches!(GithubClient::new(config), Err(HttpError::Config(_))));
    }

    #[test]
    fn test_unlistable_statuses() {
        assert!(is_unlistable(404));
        assert!(is_unlistable(409));
        assert!(is_unlistable(451));
        assert!(!is_unlistable(500));
    }
}
