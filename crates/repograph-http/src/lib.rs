// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP clients for repograph.
//!
//! - [`GithubClient`]: the source-hosting platform's REST API (rate limit,
//!   repository enumeration, commit listing, single commits), with bounded
//!   retry on transient failures.
//! - [`HookClient`]: JSON-over-HTTP function invocation, used for the kill
//!   switch and for error reports.

pub mod client;
pub mod error;
pub mod hook;
pub mod paging;
pub mod types;

pub use client::{ClientConfig, GithubClient};
pub use error::{HttpError, Result};
pub use hook::HookClient;
pub use types::{
    Account, CommitFile, CommitPage, CommitPayload, CommitStats, GitActor, GitCommit,
    RepositoryPayload,
};
