// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Crawl step interpreter.
//!
//! Drives a [`Traversal`] one command at a time: plan, intercept, execute,
//! write the resulting rows, and only then adopt the successor state. A
//! failing command therefore never leaks partial progress into the state
//! reported as last confirmed.

use tracing::{debug, info, warn};

use crate::budget::RateBudget;
use crate::error::CrawlError;
use crate::interceptor::{Pipeline, StepContext};
use crate::persistence::Persistence;
use crate::platform::RemotePlatform;
use crate::traversal::{Command, DeferReason, Event, Record, Traversal};

/// Counters of one interpreter run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RunStats {
    /// External calls issued, failed ones included.
    pub calls: u32,
    /// Repository rows upserted.
    pub repositories_written: u64,
    /// Commit rows inserted.
    pub commits_written: u64,
    /// Commit writes that hit an existing sha.
    pub commits_skipped: u64,
    /// Budget left when the run ended.
    pub budget_remaining: u32,
}

/// How an interpreter run ended.
#[derive(Debug)]
pub enum StepOutcome {
    /// The lineage has no work left.
    Completed {
        /// Final state.
        traversal: Traversal,
    },
    /// The run stopped early; `traversal` is the exact resume position.
    Deferred {
        /// Resume position.
        traversal: Traversal,
        /// What stopped the run.
        reason: DeferReason,
    },
    /// A collaborator failed.
    Failed {
        /// The failure.
        error: CrawlError,
        /// State before the failing command.
        last_confirmed: Traversal,
    },
}

/// Executes traversal commands against the platform and the database.
pub struct Interpreter<'a> {
    platform: &'a dyn RemotePlatform,
    persistence: &'a dyn Persistence,
    pipeline: Pipeline,
    hydrate: bool,
}

impl<'a> Interpreter<'a> {
    /// Interpreter running commands through `pipeline`.
    pub fn new(
        platform: &'a dyn RemotePlatform,
        persistence: &'a dyn Persistence,
        pipeline: Pipeline,
        hydrate: bool,
    ) -> Self {
        Self {
            platform,
            persistence,
            pipeline,
            hydrate,
        }
    }

    /// Run until the traversal completes, defers or fails.
    pub async fn run(
        &mut self,
        mut traversal: Traversal,
        budget: &mut RateBudget,
    ) -> (StepOutcome, RunStats) {
        let mut stats = RunStats::default();

        let outcome = loop {
            let planned = traversal.next_command();
            let command = self.intercept(planned, &traversal, budget);

            match command {
                Command::Stop => {
                    info!(frontier = traversal.frontier(), "Traversal completed");
                    break StepOutcome::Completed { traversal };
                }
                Command::Defer(reason) => {
                    info!(
                        reason = reason.as_str(),
                        frontier = traversal.frontier(),
                        discriminator = traversal.discriminator(),
                        "Traversal deferred"
                    );
                    break StepOutcome::Deferred { traversal, reason };
                }
                Command::PersistRecord(record) => {
                    if let Err(error) = self.write(&record, &mut stats).await {
                        break fail(error, traversal);
                    }
                }
                fetch => {
                    stats.calls += 1;
                    let event = match self.fetch(&fetch).await {
                        Ok(event) => event,
                        Err(error) => break fail(error, traversal),
                    };

                    let (next, follow_ups) = traversal.clone().absorb(event, self.hydrate);
                    if let Err(error) = self
                        .apply_follow_ups(follow_ups, &traversal, budget, &mut stats)
                        .await
                    {
                        break fail(error, traversal);
                    }
                    traversal = next;
                }
            }
        };

        stats.budget_remaining = budget.remaining();
        (outcome, stats)
    }

    fn intercept(
        &mut self,
        command: Command,
        traversal: &Traversal,
        budget: &mut RateBudget,
    ) -> Command {
        let mut ctx = StepContext { traversal, budget };
        self.pipeline.apply(command, &mut ctx)
    }

    async fn apply_follow_ups(
        &mut self,
        follow_ups: Vec<Command>,
        traversal: &Traversal,
        budget: &mut RateBudget,
        stats: &mut RunStats,
    ) -> Result<(), CrawlError> {
        for command in follow_ups {
            match self.intercept(command, traversal, budget) {
                Command::PersistRecord(record) => self.write(&record, stats).await?,
                other => warn!(command = other.name(), "Ignoring unexpected follow-up"),
            }
        }
        Ok(())
    }

    async fn fetch(&self, command: &Command) -> Result<Event, CrawlError> {
        match command {
            Command::FetchRepoPage { start_id } => {
                let page = self.platform.list_repositories(*start_id).await?;
                debug!(start_id, repositories = page.len(), "Repository page fetched");
                Ok(Event::RepoPage(page))
            }
            Command::FetchCommitPage { repo, page } => {
                let listing = self
                    .platform
                    .list_commits(&repo.full_name, page.as_deref())
                    .await?;
                debug!(
                    repo = %repo.full_name,
                    commits = listing.commits.len(),
                    has_next = listing.next.is_some(),
                    "Commit page fetched"
                );
                Ok(Event::CommitPage(listing))
            }
            Command::FetchCommitDetail { repo, sha } => {
                let detail = self.platform.get_commit(&repo.full_name, sha).await?;
                if detail.is_none() {
                    debug!(repo = %repo.full_name, sha = %sha, "Commit is gone, skipping");
                }
                Ok(Event::CommitDetail {
                    sha: sha.clone(),
                    detail: detail.map(Box::new),
                })
            }
            other => Err(CrawlError::database(
                "dispatch",
                format!("{} is not an external call", other.name()),
            )),
        }
    }

    async fn write(&self, record: &Record, stats: &mut RunStats) -> Result<(), CrawlError> {
        match record {
            Record::Repository(repository) => {
                self.persistence.upsert_repository(repository).await?;
                stats.repositories_written += 1;
            }
            Record::Commit(commit) => {
                if self.persistence.insert_commit(commit).await? {
                    stats.commits_written += 1;
                } else {
                    debug!(sha = %commit.sha, "Commit already stored");
                    stats.commits_skipped += 1;
                }
            }
        }
        Ok(())
    }
}

fn fail(error: CrawlError, last_confirmed: Traversal) -> StepOutcome {
    warn!(
        error_code = error.error_code(),
        frontier = last_confirmed.frontier(),
        discriminator = last_confirmed.discriminator(),
        "Traversal failed: {}",
        error
    );
    StepOutcome::Failed {
        error,
        last_confirmed,
    }
}
