// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Global kill switch.
//!
//! Queried once at the start of every execution, before any lease is taken.

use std::time::Duration;

use async_trait::async_trait;
use repograph_http::HookClient;
use serde_json::{Value, json};

use crate::error::CrawlError;

/// Decides whether executions should stop before doing any work.
#[async_trait]
pub trait KillSwitch: Send + Sync {
    /// True if the execution must stop.
    async fn should_stop(&self) -> Result<bool, CrawlError>;
}

/// Kill switch that never fires. Used when no switch is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverStop;

#[async_trait]
impl KillSwitch for NeverStop {
    async fn should_stop(&self) -> Result<bool, CrawlError> {
        Ok(false)
    }
}

/// Kill switch backed by a remote function.
///
/// POSTs `{}` to the function URL. The response must be a JSON boolean, or an
/// object with a boolean `stop` field.
pub struct HttpKillSwitch {
    hook: HookClient,
}

impl HttpKillSwitch {
    /// Query `url` with the given request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, CrawlError> {
        Ok(Self {
            hook: HookClient::new(url, timeout)?,
        })
    }
}

#[async_trait]
impl KillSwitch for HttpKillSwitch {
    async fn should_stop(&self) -> Result<bool, CrawlError> {
        let answer = self
            .hook
            .invoke(&json!({}))
            .await
            .map_err(|e| CrawlError::KillSwitch(e.to_string()))?;
        interpret(&answer)
    }
}

fn interpret(answer: &Value) -> Result<bool, CrawlError> {
    match answer {
        Value::Bool(stop) => Ok(*stop),
        Value::Object(fields) => match fields.get("stop") {
            Some(Value::Bool(stop)) => Ok(*stop),
            _ => Err(CrawlError::KillSwitch(format!(
                "expected a boolean `stop` field, got {}",
                answer
            ))),
        },
        other => Err(CrawlError::KillSwitch(format!(
            "expected a boolean, got {}",
            other
        ))),
    }
}
