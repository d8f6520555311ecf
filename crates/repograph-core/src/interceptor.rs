// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Interceptor pipeline applied to every planned command.
//!
//! Each stage sees the command produced by the previous one and may pass it
//! through or replace it. The default pipeline is
//! `Deadline -> BudgetGate -> CallTrace`: a command deferred by the deadline
//! never reaches the budget, so no unit is charged for a call that is not made.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::budget::RateBudget;
use crate::traversal::{Command, DeferReason, Traversal};

/// What an interceptor may inspect and mutate.
pub struct StepContext<'a> {
    /// State the command was planned from.
    pub traversal: &'a Traversal,
    /// Budget of the execution.
    pub budget: &'a mut RateBudget,
}

/// A stage of the pipeline.
pub trait Interceptor: Send + Sync {
    /// Stage name, used in logs.
    fn name(&self) -> &'static str;

    /// Pass `command` through, or return its replacement.
    fn intercept(&mut self, command: Command, ctx: &mut StepContext<'_>) -> Command;
}

/// Ordered list of interceptors.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Interceptor>>,
}

impl Pipeline {
    /// An empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    pub fn with(mut self, stage: impl Interceptor + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Names of the stages, in order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run `command` through every stage.
    pub fn apply(&mut self, command: Command, ctx: &mut StepContext<'_>) -> Command {
        self.stages
            .iter_mut()
            .fold(command, |command, stage| stage.intercept(command, ctx))
    }
}

/// Charges one budget unit per external call; defers when the charge is refused.
#[derive(Debug, Default)]
pub struct BudgetGate;

impl Interceptor for BudgetGate {
    fn name(&self) -> &'static str {
        "budget_gate"
    }

    fn intercept(&mut self, command: Command, ctx: &mut StepContext<'_>) -> Command {
        if !command.is_external_call() || ctx.budget.charge(1) {
            return command;
        }
        info!(
            remaining = ctx.budget.remaining(),
            floor = ctx.budget.floor(),
            frontier = ctx.traversal.frontier(),
            "Call budget exhausted"
        );
        Command::Defer(DeferReason::Budget)
    }
}

/// Defers external calls once the execution has run for longer than a limit.
#[derive(Debug)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    /// Deadline `limit` after now.
    pub fn new(limit: Duration) -> Self {
        Self::starting_at(Instant::now(), limit)
    }

    /// Deadline `limit` after `started`.
    pub fn starting_at(started: Instant, limit: Duration) -> Self {
        Self { started, limit }
    }
}

impl Interceptor for Deadline {
    fn name(&self) -> &'static str {
        "deadline"
    }

    fn intercept(&mut self, command: Command, ctx: &mut StepContext<'_>) -> Command {
        if !command.is_external_call() || self.started.elapsed() < self.limit {
            return command;
        }
        info!(
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            frontier = ctx.traversal.frontier(),
            "Runtime deadline reached"
        );
        Command::Defer(DeferReason::Deadline)
    }
}

/// Logs every command that leaves the pipeline.
#[derive(Debug, Default)]
pub struct CallTrace {
    issued: u64,
}

impl CallTrace {
    /// External calls let through so far.
    pub fn issued(&self) -> u64 {
        self.issued
    }
}

impl Interceptor for CallTrace {
    fn name(&self) -> &'static str {
        "call_trace"
    }

    fn intercept(&mut self, command: Command, ctx: &mut StepContext<'_>) -> Command {
        match &command {
            Command::FetchRepoPage { start_id } => {
                self.issued += 1;
                debug!(
                    call = self.issued,
                    start_id,
                    budget = ctx.budget.remaining(),
                    "Listing repositories"
                );
            }
            Command::FetchCommitPage { repo, page } => {
                self.issued += 1;
                debug!(
                    call = self.issued,
                    repo = %repo.full_name,
                    page = page.as_deref().unwrap_or("1"),
                    budget = ctx.budget.remaining(),
                    "Listing commits"
                );
            }
            Command::FetchCommitDetail { repo, sha } => {
                self.issued += 1;
                debug!(
                    call = self.issued,
                    repo = %repo.full_name,
                    sha = %sha,
                    budget = ctx.budget.remaining(),
                    "Fetching commit"
                );
            }
            other => debug!(command = other.name(), "Command"),
        }
        command
    }
}

/// The default pipeline, with a deadline stage if `max_runtime` is set.
pub fn default_pipeline(max_runtime: Option<Duration>) -> Pipeline {
    let pipeline = Pipeline::new();
    let pipeline = match max_runtime {
        Some(limit) => pipeline.with(Deadline::new(limit)),
        None => pipeline,
    };
    pipeline.with(BudgetGate).with(CallTrace::default())
}
