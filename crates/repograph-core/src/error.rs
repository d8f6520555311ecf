// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for repograph-core.
//!
//! Budget exhaustion, an active kill switch and a full concurrency ceiling are
//! outcomes, not errors; see [`crate::orchestrator::RunOutcome`].

use thiserror::Error;

/// Result type using CrawlError.
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Errors that end an execution as failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CrawlError {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Database operation failed.
    #[error("Database error during '{operation}': {details}")]
    Database {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The remote platform call failed after local retries.
    #[error("Platform error: {0}")]
    Platform(#[from] repograph_http::HttpError),

    /// The kill switch could not be queried or answered nonsense.
    #[error("Kill switch error: {0}")]
    KillSwitch(String),

    /// A stored continuation could not be decoded.
    #[error("Malformed continuation '{id}': {reason}")]
    MalformedContinuation {
        /// Continuation task id.
        id: String,
        /// Decoding failure.
        reason: String,
    },

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CrawlError {
    /// Stable machine-readable code, used in error reports.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Migration(_) => "MIGRATION_ERROR",
            Self::Platform(_) => "PLATFORM_ERROR",
            Self::KillSwitch(_) => "KILL_SWITCH_ERROR",
            Self::MalformedContinuation { .. } => "MALFORMED_CONTINUATION",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    /// Database error for a named operation.
    pub fn database(operation: &str, err: impl std::fmt::Display) -> Self {
        Self::Database {
            operation: operation.to_string(),
            details: err.to_string(),
        }
    }
}

impl From<sqlx::Error> for CrawlError {
    fn from(err: sqlx::Error) -> Self {
        CrawlError::database("query", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repograph_http::HttpError;

    #[test]
    fn test_error_codes() {
        let cases = vec![
            (CrawlError::database("insert", "connection refused"), "DATABASE_ERROR"),
            (
                CrawlError::Platform(HttpError::Transport("reset".into())),
                "PLATFORM_ERROR",
            ),
            (CrawlError::KillSwitch("timeout".into()), "KILL_SWITCH_ERROR"),
            (
                CrawlError::MalformedContinuation {
                    id: "t-1".into(),
                    reason: "eof".into(),
                },
                "MALFORMED_CONTINUATION",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.error_code(), expected, "{:?}", error);
        }
    }

    #[test]
    fn test_display() {
        let err = CrawlError::database("insert", "connection refused");
        assert_eq!(
            err.to_string(),
            "Database error during 'insert': connection refused"
        );

        let err = CrawlError::MalformedContinuation {
            id: "abc".into(),
            reason: "missing field".into(),
        };
        assert_eq!(err.to_string(), "Malformed continuation 'abc': missing field");
    }

    #[test]
    fn test_from_sqlx() {
        let err: CrawlError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, CrawlError::Database { ref operation, .. } if operation == "query"));
    }
}
