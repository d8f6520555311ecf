// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Failure reporting.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use repograph_http::HookClient;
use serde::Serialize;
use tracing::error;

use crate::error::CrawlError;

/// What a failed execution reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    /// Stable error code, see [`CrawlError::error_code`].
    pub error_code: String,
    /// Human-readable error.
    pub message: String,
    /// Phase the traversal was in, if the failure happened during traversal.
    pub phase: Option<String>,
    /// Lowest repository id not fully recorded, if known.
    pub frontier: Option<i64>,
    /// Continuation saved for the lineage after the failure, if any.
    pub continuation_id: Option<String>,
    /// When the failure was observed.
    pub occurred_at: DateTime<Utc>,
}

impl FailureReport {
    /// Report for `error` with no traversal context.
    pub fn new(error: &CrawlError) -> Self {
        Self {
            error_code: error.error_code().to_string(),
            message: error.to_string(),
            phase: None,
            frontier: None,
            continuation_id: None,
            occurred_at: Utc::now(),
        }
    }
}

/// Receives failure reports.
#[async_trait]
pub trait ErrorReporter: Send + Sync {
    /// Deliver a report.
    async fn report(&self, report: &FailureReport) -> Result<(), CrawlError>;
}

/// Reporter that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

#[async_trait]
impl ErrorReporter for TracingReporter {
    async fn report(&self, report: &FailureReport) -> Result<(), CrawlError> {
        error!(
            error_code = %report.error_code,
            phase = report.phase.as_deref().unwrap_or("-"),
            frontier = ?report.frontier,
            continuation_id = ?report.continuation_id,
            "Execution failed: {}",
            report.message
        );
        Ok(())
    }
}

/// Reporter that logs, then POSTs the report as JSON to a webhook.
pub struct WebhookReporter {
    hook: HookClient,
}

impl WebhookReporter {
    /// Post reports to `url`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, CrawlError> {
        Ok(Self {
            hook: HookClient::new(url, timeout)?,
        })
    }
}

#[async_trait]
impl ErrorReporter for WebhookReporter {
    async fn report(&self, report: &FailureReport) -> Result<(), CrawlError> {
        TracingReporter.report(report).await?;
        self.hook.invoke(report).await?;
        Ok(())
    }
}
