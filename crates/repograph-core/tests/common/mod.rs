// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for repograph-core integration tests.
//!
//! Provides TestContext: an in-memory SQLite database, a scripted platform and
//! recording collaborators wired into an orchestrator.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use repograph_core::config::CrawlConfig;
use repograph_core::continuation::ContinuationStore;
use repograph_core::error::CrawlError;
use repograph_core::kill_switch::KillSwitch;
use repograph_core::orchestrator::Orchestrator;
use repograph_core::persistence::{self, Persistence};
use repograph_core::platform::mock::MockPlatform;
use repograph_core::report::{ErrorReporter, FailureReport};

/// Kill switch with a fixed answer.
pub enum ScriptedKillSwitch {
    Answer(bool),
    Unreachable,
}

#[async_trait]
impl KillSwitch for ScriptedKillSwitch {
    async fn should_stop(&self) -> Result<bool, CrawlError> {
        match self {
            ScriptedKillSwitch::Answer(stop) => Ok(*stop),
            ScriptedKillSwitch::Unreachable => {
                Err(CrawlError::KillSwitch("connection refused".to_string()))
            }
        }
    }
}

/// Reporter that keeps every report.
#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<FailureReport>>,
}

impl RecordingReporter {
    pub async fn reports(&self) -> Vec<FailureReport> {
        self.reports.lock().await.clone()
    }
}

#[async_trait]
impl ErrorReporter for RecordingReporter {
    async fn report(&self, report: &FailureReport) -> Result<(), CrawlError> {
        self.reports.lock().await.push(report.clone());
        Ok(())
    }
}

/// Database, platform and reporter shared by the executions of one test.
pub struct TestContext {
    pub persistence: Arc<dyn Persistence>,
    pub platform: Arc<MockPlatform>,
    pub reporter: Arc<RecordingReporter>,
}

impl TestContext {
    pub async fn new(platform: MockPlatform) -> Self {
        let persistence = persistence::connect("sqlite::memory:")
            .await
            .expect("Failed to open in-memory database");
        Self {
            persistence,
            platform: Arc::new(platform),
            reporter: Arc::new(RecordingReporter::default()),
        }
    }

    /// Orchestrator for one execution with `config`.
    pub fn orchestrator(&self, config: CrawlConfig) -> Orchestrator {
        Orchestrator::new(config, self.persistence.clone(), self.platform.clone())
            .with_reporter(self.reporter.clone())
    }

    pub fn continuations(&self) -> ContinuationStore {
        ContinuationStore::new(self.persistence.clone())
    }

    pub async fn counts(&self) -> (i64, i64, i64, i64) {
        (
            self.persistence.count_repositories().await.unwrap(),
            self.persistence.count_commits().await.unwrap(),
            self.persistence.count_continuations().await.unwrap(),
            self.persistence.count_leases().await.unwrap(),
        )
    }
}

/// Bootstrap configuration starting at `start`, no hydration, floor 1.
pub fn bootstrap(start: i64) -> CrawlConfig {
    CrawlConfig {
        bootstrap: true,
        start_repository_id: start,
        rate_floor: 1,
        hydrate_commits: false,
        ..CrawlConfig::default()
    }
}

/// Resume configuration, no hydration, floor 1.
pub fn resume() -> CrawlConfig {
    CrawlConfig {
        bootstrap: false,
        rate_floor: 1,
        hydrate_commits: false,
        ..CrawlConfig::default()
    }
}

/// Ten repositories from `start`, one per page, one commit each.
pub fn ten_repositories(remaining: u32, start: i64) -> MockPlatform {
    let mut platform = MockPlatform::new(remaining)
        .with_repositories(start..start + 10)
        .repos_per_page(1);
    for id in start..start + 10 {
        platform = platform.with_commits(id, [format!("{:040x}", id)]);
    }
    platform
}
