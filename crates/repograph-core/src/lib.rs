// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Repograph Core - Resumable Repository Crawler
//!
//! This crate crawls a source-hosting platform's repositories and commits into a
//! relational store. Work is split across many short, independently triggered
//! executions that share no memory: each one spends the platform's call budget,
//! and when the budget runs out it leaves a continuation that the next
//! execution resumes from exactly where this one stopped.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            Orchestrator                              │
//! │   kill switch ─▶ lease ─▶ starting point ─▶ budget ─▶ interpreter    │
//! └──────────────────────────────────────────────────────────────────────┘
//!        │               │              │                      │
//!        ▼               ▼              ▼                      ▼
//! ┌─────────────┐ ┌─────────────┐ ┌──────────────┐  ┌──────────────────────┐
//! │ KillSwitch  │ │ Concurrency │ │ Continuation │  │ Interpreter          │
//! │ (webhook)   │ │ Registry    │ │ Store        │  │  Traversal (pure)    │
//! └─────────────┘ └─────────────┘ └──────────────┘  │  Pipeline            │
//!                        │              │           │   Deadline           │
//!                        │              │           │   BudgetGate         │
//!                        │              │           │   CallTrace          │
//!                        │              │           └──────────────────────┘
//!                        │              │                │            │
//!                        ▼              ▼                ▼            ▼
//!                 ┌──────────────────────────────┐  ┌──────────────────────┐
//!                 │   PostgreSQL / SQLite        │  │  RemotePlatform      │
//!                 │ repositories, commits,       │  │  (GitHub REST)       │
//!                 │ continuation_tasks, leases   │  └──────────────────────┘
//!                 └──────────────────────────────┘
//! ```
//!
//! # Execution Outcomes
//!
//! | Outcome | Meaning | Exit status |
//! |---------|---------|-------------|
//! | `Completed` | The lineage has no work left | 0 |
//! | `Deferred` | Budget or deadline ran out; a continuation was saved | 0 |
//! | `Stopped` | Kill switch active or concurrency ceiling reached | 0 |
//! | `Failed` | A platform or database error; reported | 1 |
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables, see [`config::Config`].
//! The most important ones:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `REPOGRAPH_DATABASE_URL` | Yes | - | `postgres://` or `sqlite:` URL |
//! | `REPOGRAPH_GITHUB_TOKEN` | No | - | Platform API token |
//! | `REPOGRAPH_BOOTSTRAP` | No | `false` | Start a new lineage instead of resuming |
//! | `REPOGRAPH_MAX_CONCURRENCY` | No | `1` | Lease ceiling |
//! | `REPOGRAPH_RATE_FLOOR` | No | `10` | Calls held back from the budget |
//!
//! # Modules
//!
//! - [`budget`]: Per-execution call budget
//! - [`registry`]: Execution leases and the concurrency ceiling
//! - [`continuation`]: Saving and taking resume positions
//! - [`traversal`]: Traversal state and its pure transitions
//! - [`interceptor`]: Command pipeline stages
//! - [`interpreter`]: Command execution loop
//! - [`orchestrator`]: One execution, end to end
//! - [`persistence`]: Postgres and SQLite storage

#![deny(missing_docs)]

/// Per-execution call budget with a reserved floor.
pub mod budget;

/// Configuration loaded from environment variables.
pub mod config;

/// Continuation tasks: serialized resume positions.
pub mod continuation;

/// Error types with stable error codes.
pub mod error;

/// Interceptors applied to every planned command.
pub mod interceptor;

/// The command execution loop.
pub mod interpreter;

/// Global kill switch.
pub mod kill_switch;

/// Platform payload to row mapping.
pub mod mapper;

/// Embedded database migrations.
pub mod migrations;

/// The execution orchestrator.
pub mod orchestrator;

/// Persistence trait and backends.
pub mod persistence;

/// Remote platform abstraction and adapters.
pub mod platform;

/// Execution lease registry.
pub mod registry;

/// Failure reporting.
pub mod report;

/// Traversal state machine.
pub mod traversal;

pub use error::{CrawlError, Result};
pub use orchestrator::{Orchestrator, RunOutcome, StopReason};
