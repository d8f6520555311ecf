// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for repograph-http.

use thiserror::Error;

/// Errors returned by the platform and webhook clients.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HttpError {
    /// The request could not be sent or the connection failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a status the client does not handle.
    #[error("unexpected status {status} from {url}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Request URL.
        url: String,
        /// Response body or reason phrase.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("malformed response from {url}: {reason}")]
    Malformed {
        /// Request URL.
        url: String,
        /// Decoding failure.
        reason: String,
    },

    /// The client was built with an invalid setting.
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl HttpError {
    /// Whether retrying the same request may succeed.
    ///
    /// Transport failures, 5xx responses and secondary rate limit answers
    /// (403/429) are transient; everything else is final.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429 || *status == 403,
            Self::Malformed { .. } | Self::Config(_) => false,
        }
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            HttpError::Malformed {
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
                reason: err.to_string(),
            }
        } else {
            HttpError::Transport(err.to_string())
        }
    }
}

/// Result type using HttpError.
pub type Result<T> = std::result::Result<T, HttpError>;
