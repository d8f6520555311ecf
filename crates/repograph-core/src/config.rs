// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Complete configuration of one execution.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL or SQLite connection URL
    pub database_url: String,
    /// Remote platform client settings
    pub platform: PlatformConfig,
    /// Crawl scheduling settings
    pub crawl: CrawlConfig,
    /// Kill switch function URL; no kill switch when unset
    pub kill_switch_url: Option<String>,
    /// Error report webhook URL; reports go to the log when unset
    pub report_url: Option<String>,
}

/// Remote platform client settings.
#[derive(Clone)]
pub struct PlatformConfig {
    /// API base URL
    pub api_url: String,
    /// Bearer token
    pub token: Option<String>,
    /// Commits per listing page
    pub commits_per_page: u32,
    /// Retries after a transient failure
    pub max_retries: u32,
}

impl fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("commits_per_page", &self.commits_per_page)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Crawl scheduling settings consumed by the orchestrator.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Start a new lineage at `start_repository_id` instead of resuming.
    pub bootstrap: bool,
    /// First repository id of a bootstrapped lineage.
    pub start_repository_id: i64,
    /// Exclusive upper bound of a bootstrapped lineage.
    pub end_repository_id: Option<i64>,
    /// Maximum number of concurrently running executions.
    pub max_concurrency: u32,
    /// Budget units kept in reserve; never zero.
    pub rate_floor: u32,
    /// Lifetime of an execution lease before it may be reaped.
    pub lease_ttl: Duration,
    /// Fetch every listed commit individually for line statistics.
    pub hydrate_commits: bool,
    /// Defer once the execution has been running this long.
    pub max_runtime: Option<Duration>,
    /// Clear crawl tables when bootstrapping.
    pub reset_on_bootstrap: bool,
    /// Save the last confirmed position when an execution fails.
    pub resume_after_failure: bool,
    /// Failed executions in a row after which the repository being scanned
    /// is skipped.
    pub max_failed_attempts: u32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            bootstrap: false,
            start_repository_id: 0,
            end_repository_id: None,
            max_concurrency: 1,
            rate_floor: 10,
            lease_ttl: Duration::from_secs(900),
            hydrate_commits: true,
            max_runtime: None,
            reset_on_bootstrap: false,
            resume_after_failure: true,
            max_failed_attempts: 3,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `REPOGRAPH_DATABASE_URL`: PostgreSQL or SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `REPOGRAPH_GITHUB_API` (https://api.github.com), `REPOGRAPH_GITHUB_TOKEN`
    /// - `REPOGRAPH_BOOTSTRAP` (false), `REPOGRAPH_START_REPOSITORY_ID` (0),
    ///   `REPOGRAPH_END_REPOSITORY_ID`
    /// - `REPOGRAPH_MAX_CONCURRENCY` (1), `REPOGRAPH_RATE_FLOOR` (10),
    ///   `REPOGRAPH_LEASE_TTL_SECS` (900)
    /// - `REPOGRAPH_KILL_SWITCH_URL`, `REPOGRAPH_REPORT_URL`
    /// - `REPOGRAPH_HYDRATE_COMMITS` (true), `REPOGRAPH_MAX_RUNTIME_SECS`
    /// - `REPOGRAPH_RESET_ON_BOOTSTRAP` (false), `REPOGRAPH_RESUME_AFTER_FAILURE` (true),
    ///   `REPOGRAPH_MAX_FAILED_ATTEMPTS` (3)
    /// - `REPOGRAPH_COMMITS_PER_PAGE` (100), `REPOGRAPH_HTTP_RETRIES` (3)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("REPOGRAPH_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("REPOGRAPH_DATABASE_URL"))?;

        let defaults = CrawlConfig::default();

        let max_concurrency: u32 = parse_or(
            "REPOGRAPH_MAX_CONCURRENCY",
            defaults.max_concurrency,
            "must be a positive integer",
        )?;
        if max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "REPOGRAPH_MAX_CONCURRENCY",
                "must be at least 1",
            ));
        }

        let rate_floor: u32 = parse_or(
            "REPOGRAPH_RATE_FLOOR",
            defaults.rate_floor,
            "must be a positive integer",
        )?;
        if rate_floor == 0 {
            return Err(ConfigError::Invalid(
                "REPOGRAPH_RATE_FLOOR",
                "must be at least 1",
            ));
        }

        let start_repository_id: i64 = parse_or(
            "REPOGRAPH_START_REPOSITORY_ID",
            defaults.start_repository_id,
            "must be an integer",
        )?;
        let end_repository_id: Option<i64> =
            parse_opt("REPOGRAPH_END_REPOSITORY_ID", "must be an integer")?;
        if let Some(end) = end_repository_id
            && end <= start_repository_id
        {
            return Err(ConfigError::Invalid(
                "REPOGRAPH_END_REPOSITORY_ID",
                "must be greater than REPOGRAPH_START_REPOSITORY_ID",
            ));
        }

        let lease_ttl_secs: u64 = parse_or(
            "REPOGRAPH_LEASE_TTL_SECS",
            defaults.lease_ttl.as_secs(),
            "must be a number of seconds",
        )?;
        if lease_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "REPOGRAPH_LEASE_TTL_SECS",
                "must be at least 1",
            ));
        }
        let max_runtime_secs: Option<u64> =
            parse_opt("REPOGRAPH_MAX_RUNTIME_SECS", "must be a number of seconds")?;

        let max_failed_attempts: u32 = parse_or(
            "REPOGRAPH_MAX_FAILED_ATTEMPTS",
            defaults.max_failed_attempts,
            "must be a positive integer",
        )?;
        if max_failed_attempts == 0 {
            return Err(ConfigError::Invalid(
                "REPOGRAPH_MAX_FAILED_ATTEMPTS",
                "must be at least 1",
            ));
        }

        let commits_per_page: u32 = parse_or(
            "REPOGRAPH_COMMITS_PER_PAGE",
            100,
            "must be between 1 and 100",
        )?;
        if !(1..=100).contains(&commits_per_page) {
            return Err(ConfigError::Invalid(
                "REPOGRAPH_COMMITS_PER_PAGE",
                "must be between 1 and 100",
            ));
        }

        let crawl = CrawlConfig {
            bootstrap: flag("REPOGRAPH_BOOTSTRAP", defaults.bootstrap),
            start_repository_id,
            end_repository_id,
            max_concurrency,
            rate_floor,
            lease_ttl: Duration::from_secs(lease_ttl_secs),
            hydrate_commits: flag("REPOGRAPH_HYDRATE_COMMITS", defaults.hydrate_commits),
            max_runtime: max_runtime_secs.map(Duration::from_secs),
            reset_on_bootstrap: flag("REPOGRAPH_RESET_ON_BOOTSTRAP", defaults.reset_on_bootstrap),
            resume_after_failure: flag(
                "REPOGRAPH_RESUME_AFTER_FAILURE",
                defaults.resume_after_failure,
            ),
            max_failed_attempts,
        };

        let platform = PlatformConfig {
            api_url: std::env::var("REPOGRAPH_GITHUB_API")
                .unwrap_or_else(|_| "https://api.github.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            token: non_empty("REPOGRAPH_GITHUB_TOKEN"),
            commits_per_page,
            max_retries: parse_or(
                "REPOGRAPH_HTTP_RETRIES",
                3,
                "must be a non-negative integer",
            )?,
        };

        Ok(Self {
            database_url,
            platform,
            crawl,
            kill_switch_url: non_empty("REPOGRAPH_KILL_SWITCH_URL"),
            report_url: non_empty("REPOGRAPH_REPORT_URL"),
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn parse_or<T: FromStr>(
    key: &'static str,
    default: T,
    reason: &'static str,
) -> Result<T, ConfigError> {
    Ok(parse_opt(key, reason)?.unwrap_or(default))
}

fn parse_opt<T: FromStr>(
    key: &'static str,
    reason: &'static str,
) -> Result<Option<T>, ConfigError> {
    match non_empty(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(key, reason)),
        None => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
