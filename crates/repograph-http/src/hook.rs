// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! JSON webhook client.
//!
//! Used for the function-style collaborators around a crawl: the kill switch
//! (invoked with an empty JSON object, answers with a JSON value) and the
//! error report sink.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::error::{HttpError, Result};

/// Posts JSON documents to a fixed URL.
#[derive(Debug, Clone)]
pub struct HookClient {
    http: reqwest::Client,
    url: String,
}

impl HookClient {
    /// Build a client for `url`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HttpError::Config(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST `body` and decode the answer as JSON. An empty body decodes as `null`.
    pub async fn invoke<B: Serialize + ?Sized>(&self, body: &B) -> Result<Value> {
        let response = self.http.post(&self.url).json(body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(HttpError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&bytes).map_err(|e| HttpError::Malformed {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }
}
