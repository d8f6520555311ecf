// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Execution orchestrator.
//!
//! One call to [`Orchestrator::run`] is one execution:
//!
//! 1. ask the kill switch whether to run at all;
//! 2. take a lease from the [`ConcurrencyRegistry`] and keep renewing it;
//! 3. pick the starting point (bootstrap, or the oldest continuation);
//! 4. fetch the call budget from the platform;
//! 5. run the [`Interpreter`] and save a continuation if it deferred;
//! 6. release the lease.
//!
//! Every gate that says "no" ends the execution as [`RunOutcome::Stopped`]
//! without touching anything behind it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::budget::RateBudget;
use crate::config::{Config, CrawlConfig};
use crate::continuation::ContinuationStore;
use crate::error::CrawlError;
use crate::interceptor::default_pipeline;
use crate::interpreter::{Interpreter, RunStats, StepOutcome};
use crate::kill_switch::{HttpKillSwitch, KillSwitch, NeverStop};
use crate::persistence::{self, Persistence};
use crate::platform::{GithubPlatform, RemotePlatform};
use crate::registry::{ConcurrencyRegistry, Lease};
use crate::report::{ErrorReporter, FailureReport, TracingReporter, WebhookReporter};
use crate::traversal::{DeferReason, Traversal};

/// Request timeout for the kill switch and report webhooks.
const HOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Why an execution stopped without crawling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The kill switch answered "stop".
    KillSwitch,
    /// The concurrency ceiling was reached.
    ConcurrencyCeiling,
}

/// Result of one execution.
#[derive(Debug)]
pub enum RunOutcome {
    /// The lineage finished.
    Completed {
        /// Run counters.
        stats: RunStats,
    },
    /// The run stopped early and left a continuation.
    Deferred {
        /// Id of the saved continuation.
        continuation_id: String,
        /// What stopped the run.
        reason: DeferReason,
        /// Run counters.
        stats: RunStats,
    },
    /// A gate refused the execution.
    Stopped {
        /// Which gate.
        reason: StopReason,
        /// Run counters (all zero).
        stats: RunStats,
    },
    /// The execution failed. The failure has been reported.
    Failed {
        /// The failure.
        error: CrawlError,
        /// Continuation re-saved from the last confirmed state, if any.
        continuation_id: Option<String>,
        /// Run counters.
        stats: RunStats,
    },
}

impl RunOutcome {
    /// Counters of the run.
    pub fn stats(&self) -> RunStats {
        match self {
            RunOutcome::Completed { stats }
            | RunOutcome::Deferred { stats, .. }
            | RunOutcome::Stopped { stats, .. }
            | RunOutcome::Failed { stats, .. } => *stats,
        }
    }

    /// Short name used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Completed { .. } => "completed",
            RunOutcome::Deferred { .. } => "deferred",
            RunOutcome::Stopped { .. } => "stopped",
            RunOutcome::Failed { .. } => "failed",
        }
    }

    /// Process exit status for the outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Failed { .. } => 1,
            _ => 0,
        }
    }

    fn stopped(reason: StopReason) -> Self {
        RunOutcome::Stopped {
            reason,
            stats: RunStats::default(),
        }
    }
}

/// Composes the collaborators of one execution.
pub struct Orchestrator {
    config: CrawlConfig,
    persistence: Arc<dyn Persistence>,
    platform: Arc<dyn RemotePlatform>,
    kill_switch: Arc<dyn KillSwitch>,
    reporter: Arc<dyn ErrorReporter>,
    registry: ConcurrencyRegistry,
    continuations: ContinuationStore,
}

impl Orchestrator {
    /// Orchestrator with no kill switch and a logging-only reporter.
    pub fn new(
        config: CrawlConfig,
        persistence: Arc<dyn Persistence>,
        platform: Arc<dyn RemotePlatform>,
    ) -> Self {
        let registry = ConcurrencyRegistry::new(
            persistence.clone(),
            config.max_concurrency,
            config.lease_ttl,
        );
        let continuations = ContinuationStore::new(persistence.clone());
        Self {
            config,
            persistence,
            platform,
            kill_switch: Arc::new(NeverStop),
            reporter: Arc::new(TracingReporter),
            registry,
            continuations,
        }
    }

    /// Orchestrator wired from the process configuration: GitHub platform,
    /// HTTP kill switch and webhook reporter when their URLs are set.
    pub fn from_config(
        config: &Config,
        persistence: Arc<dyn Persistence>,
    ) -> Result<Self, CrawlError> {
        let platform = GithubPlatform::from_config(&config.platform)?;
        let mut orchestrator = Self::new(config.crawl.clone(), persistence, Arc::new(platform));

        if let Some(url) = &config.kill_switch_url {
            orchestrator = orchestrator.with_kill_switch(Arc::new(HttpKillSwitch::new(
                url.clone(),
                HOOK_TIMEOUT,
            )?));
        }
        if let Some(url) = &config.report_url {
            orchestrator = orchestrator
                .with_reporter(Arc::new(WebhookReporter::new(url.clone(), HOOK_TIMEOUT)?));
        }
        Ok(orchestrator)
    }

    /// Use `kill_switch` instead of [`NeverStop`].
    pub fn with_kill_switch(mut self, kill_switch: Arc<dyn KillSwitch>) -> Self {
        self.kill_switch = kill_switch;
        self
    }

    /// Use `reporter` instead of [`TracingReporter`].
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// The registry leases are taken from.
    pub fn registry(&self) -> &ConcurrencyRegistry {
        &self.registry
    }

    /// Run one execution.
    pub async fn run(&self) -> RunOutcome {
        match self.kill_switch.should_stop().await {
            Ok(true) => {
                info!("Kill switch is active, not running");
                return RunOutcome::stopped(StopReason::KillSwitch);
            }
            Ok(false) => {}
            Err(error) => return self.failed(error, None, RunStats::default()).await,
        }

        let lease = match self.registry.acquire().await {
            Ok(Some(lease)) => lease,
            Ok(None) => return RunOutcome::stopped(StopReason::ConcurrencyCeiling),
            Err(error) => return self.failed(error, None, RunStats::default()).await,
        };

        let heartbeat = self.registry.keep_alive(&lease);
        let outcome = self.run_leased(&lease).await;
        if heartbeat.is_finished() {
            warn!(lease_id = %lease.id, "Lease was lost during the execution");
        }
        heartbeat.stop();

        if let Err(e) = self.registry.release(&lease).await {
            warn!(lease_id = %lease.id, "Failed to release lease, it will expire: {}", e);
        }

        let stats = outcome.stats();
        info!(
            outcome = outcome.label(),
            calls = stats.calls,
            repositories = stats.repositories_written,
            commits = stats.commits_written,
            duplicate_commits = stats.commits_skipped,
            budget_remaining = stats.budget_remaining,
            "Execution finished"
        );
        outcome
    }

    async fn run_leased(&self, lease: &Lease) -> RunOutcome {
        let traversal = match self.starting_point(lease).await {
            Ok(traversal) => traversal,
            Err(error) => return self.failed(error, None, RunStats::default()).await,
        };

        let remaining = match self.platform.remaining_calls().await {
            Ok(remaining) => remaining,
            Err(error) => {
                return self
                    .failed(error, Some(traversal), RunStats::default())
                    .await;
            }
        };
        info!(
            remaining,
            floor = self.config.rate_floor,
            "Starting call budget"
        );

        let mut budget = RateBudget::new(remaining, self.config.rate_floor);
        let mut interpreter = Interpreter::new(
            self.platform.as_ref(),
            self.persistence.as_ref(),
            default_pipeline(self.config.max_runtime),
            self.config.hydrate_commits,
        );
        let (outcome, stats) = interpreter.run(traversal, &mut budget).await;

        match outcome {
            StepOutcome::Completed { .. } => RunOutcome::Completed { stats },
            StepOutcome::Deferred { traversal, reason } => {
                match self.continuations.save(&traversal).await {
                    Ok(continuation_id) => RunOutcome::Deferred {
                        continuation_id,
                        reason,
                        stats,
                    },
                    Err(error) => {
                        error!(
                            frontier = traversal.frontier(),
                            "Could not save continuation, lineage position is lost"
                        );
                        self.failed(error, None, stats).await
                    }
                }
            }
            StepOutcome::Failed {
                error,
                last_confirmed,
            } => {
                let (position, skipped) =
                    last_confirmed.record_failure(self.config.max_failed_attempts);
                if let Some(repo) = skipped {
                    warn!(
                        repo_id = repo.id,
                        repo = %repo.full_name,
                        attempts = self.config.max_failed_attempts,
                        "Skipping repository after repeated failures"
                    );
                }
                self.failed(error, Some(position), stats).await
            }
        }
    }

    async fn starting_point(&self, lease: &Lease) -> Result<Traversal, CrawlError> {
        if self.config.bootstrap {
            if self.config.reset_on_bootstrap {
                warn!("Resetting crawl data before bootstrap");
                self.persistence.reset_crawl(&lease.id).await?;
            }
            info!(
                start = self.config.start_repository_id,
                end = ?self.config.end_repository_id,
                "Bootstrapping new lineage"
            );
            return Ok(Traversal::starting_at(
                self.config.start_repository_id,
                self.config.end_repository_id,
            ));
        }

        match self.continuations.take().await? {
            Some(continuation) => Ok(continuation.traversal),
            None => {
                info!("No continuation pending, starting a full scan");
                Ok(Traversal::starting_at(0, None))
            }
        }
    }

    async fn failed(
        &self,
        error: CrawlError,
        last_confirmed: Option<Traversal>,
        stats: RunStats,
    ) -> RunOutcome {
        let mut report = FailureReport::new(&error);
        let mut continuation_id = None;

        if let Some(traversal) = &last_confirmed {
            report.phase = Some(traversal.discriminator().to_string());
            report.frontier = Some(traversal.frontier());

            if self.config.resume_after_failure {
                match self.continuations.save(traversal).await {
                    Ok(id) => continuation_id = Some(id),
                    Err(e) => error!("Could not re-save continuation after failure: {}", e),
                }
            }
        }
        report.continuation_id = continuation_id.clone();

        if let Err(e) = self.reporter.report(&report).await {
            error!("Could not deliver failure report: {}", e);
        }

        RunOutcome::Failed {
            error,
            continuation_id,
            stats,
        }
    }
}

/// Run one execution from the process configuration.
///
/// Opens the database and builds the collaborators first. If either step
/// fails no lease has been taken; the failure is reported through the
/// configured report webhook (or the log) and returned as
/// [`RunOutcome::Failed`].
pub async fn execute(config: &Config) -> RunOutcome {
    let prepared = match persistence::connect(&config.database_url).await {
        Ok(persistence) => Orchestrator::from_config(config, persistence),
        Err(e) => Err(e),
    };

    match prepared {
        Ok(orchestrator) => orchestrator.run().await,
        Err(error) => {
            error!(error_code = error.error_code(), "Execution could not start: {}", error);
            let reporter = startup_reporter(config);
            if let Err(e) = reporter.report(&FailureReport::new(&error)).await {
                error!("Could not deliver failure report: {}", e);
            }
            RunOutcome::Failed {
                error,
                continuation_id: None,
                stats: RunStats::default(),
            }
        }
    }
}

fn startup_reporter(config: &Config) -> Arc<dyn ErrorReporter> {
    let Some(url) = &config.report_url else {
        return Arc::new(TracingReporter);
    };
    match WebhookReporter::new(url.clone(), HOOK_TIMEOUT) {
        Ok(reporter) => Arc::new(reporter),
        Err(e) => {
            error!("Report webhook unusable, logging only: {}", e);
            Arc::new(TracingReporter)
        }
    }
}
