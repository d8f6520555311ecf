// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Crawl traversal state and its pure transition functions.
//!
//! A [`Traversal`] is the complete resume position of one lineage. The
//! interpreter asks it for the next [`Command`] with [`Traversal::next_command`],
//! executes that command, and folds the response back in with
//! [`Traversal::absorb`], which returns the successor state together with the
//! follow-up commands (row writes) that must succeed before the successor may
//! be treated as confirmed.
//!
//! ```text
//!   ScanningRepositories ──page──▶ FetchingCommitsForRepo ──(hydrate)──▶ FetchingCommitDetail
//!          ▲                              │        ▲                              │
//!          └────────── queue empty ───────┘        └──────── shas drained ────────┘
//! ```

use std::collections::VecDeque;

use repograph_http::{CommitPage, CommitPayload, RepositoryPayload};
use serde::{Deserialize, Serialize};

use crate::mapper;
use crate::persistence::{CommitRecord, RepositoryRecord};

/// Discriminator for a lineage still enumerating repositories.
pub const SCAN_REPOSITORIES: &str = "scan_repositories";
/// Discriminator for a lineage paging through a repository's commits.
pub const FETCH_COMMITS: &str = "fetch_commits";
/// Discriminator for a lineage hydrating listed commits.
pub const FETCH_COMMIT_DETAIL: &str = "fetch_commit_detail";

/// A repository that has been persisted and is waiting for, or undergoing,
/// commit scanning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    /// Repository id.
    pub id: i64,
    /// `owner/name`, used to address the commit endpoints.
    pub full_name: String,
}

/// Position inside a repository's commit listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "page", rename_all = "snake_case")]
pub enum CommitPaging {
    /// No page fetched yet.
    Start,
    /// The opaque cursor of the next page.
    Next(String),
    /// The listing has been fully fetched.
    Done,
}

/// Commit scan of the active repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitScan {
    /// The repository being scanned.
    pub repo: RepoRef,
    /// Listing position.
    pub paging: CommitPaging,
    /// Listed shas whose detail has not been fetched and written yet.
    #[serde(default)]
    pub awaiting_detail: VecDeque<String>,
}

impl CommitScan {
    fn new(repo: RepoRef) -> Self {
        Self {
            repo,
            paging: CommitPaging::Start,
            awaiting_detail: VecDeque::new(),
        }
    }

    fn finished(&self) -> bool {
        self.paging == CommitPaging::Done && self.awaiting_detail.is_empty()
    }
}

/// A row the interpreter must write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Upserted by id.
    Repository(RepositoryRecord),
    /// Inserted once by sha.
    Commit(CommitRecord),
}

/// Why a traversal stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// The next call would take the budget below its floor.
    Budget,
    /// The execution ran past its runtime deadline.
    Deadline,
}

impl DeferReason {
    /// Short name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeferReason::Budget => "budget",
            DeferReason::Deadline => "deadline",
        }
    }
}

/// One step of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List repositories with id >= `start_id`, ascending.
    FetchRepoPage {
        /// Lowest id to list.
        start_id: i64,
    },
    /// List one page of a repository's commits.
    FetchCommitPage {
        /// Repository to list.
        repo: RepoRef,
        /// Cursor, `None` for the first page.
        page: Option<String>,
    },
    /// Fetch a single commit with stats and files.
    FetchCommitDetail {
        /// Owning repository.
        repo: RepoRef,
        /// Commit hash.
        sha: String,
    },
    /// Write a row.
    PersistRecord(Record),
    /// Stop here and leave a continuation.
    Defer(DeferReason),
    /// The traversal is complete.
    Stop,
}

impl Command {
    /// Whether executing this command costs a platform call.
    pub fn is_external_call(&self) -> bool {
        matches!(
            self,
            Command::FetchRepoPage { .. }
                | Command::FetchCommitPage { .. }
                | Command::FetchCommitDetail { .. }
        )
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::FetchRepoPage { .. } => "fetch_repo_page",
            Command::FetchCommitPage { .. } => "fetch_commit_page",
            Command::FetchCommitDetail { .. } => "fetch_commit_detail",
            Command::PersistRecord(Record::Repository(_)) => "persist_repository",
            Command::PersistRecord(Record::Commit(_)) => "persist_commit",
            Command::Defer(_) => "defer",
            Command::Stop => "stop",
        }
    }
}

/// Response to an external call.
#[derive(Debug, Clone)]
pub enum Event {
    /// Response to [`Command::FetchRepoPage`].
    RepoPage(Vec<RepositoryPayload>),
    /// Response to [`Command::FetchCommitPage`].
    CommitPage(CommitPage),
    /// Response to [`Command::FetchCommitDetail`]. `None` if the commit is gone.
    CommitDetail {
        /// Requested sha.
        sha: String,
        /// The commit, if it still exists.
        detail: Option<Box<CommitPayload>>,
    },
}

/// Resume position of one lineage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traversal {
    next_start: i64,
    #[serde(default)]
    until: Option<i64>,
    #[serde(default)]
    queued: VecDeque<RepoRef>,
    #[serde(default)]
    active: Option<CommitScan>,
    #[serde(default)]
    exhausted: bool,
    /// Consecutive failed executions at this position.
    #[serde(default)]
    failed_attempts: u32,
}

impl Traversal {
    /// A new lineage enumerating ids in `start..until`.
    pub fn starting_at(start: i64, until: Option<i64>) -> Self {
        Self {
            next_start: start.max(0),
            until,
            queued: VecDeque::new(),
            active: None,
            exhausted: false,
            failed_attempts: 0,
        }
    }

    /// Id of the next repository page to request.
    pub fn next_start(&self) -> i64 {
        self.next_start
    }

    /// Exclusive upper bound of the lineage, if any.
    pub fn until(&self) -> Option<i64> {
        self.until
    }

    /// Persisted repositories whose commits have not been scanned.
    pub fn queued(&self) -> &VecDeque<RepoRef> {
        &self.queued
    }

    /// The repository whose commits are being scanned.
    pub fn active(&self) -> Option<&CommitScan> {
        self.active.as_ref()
    }

    /// Executions that failed in a row without moving past this position.
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// Count a failed execution at this position.
    ///
    /// Once `limit` failures pile up while a repository's commits are being
    /// scanned, that repository is given up on: its scan is dropped, the next
    /// queued repository becomes active and the count restarts. Returns the
    /// skipped repository, if any. Failures while enumerating repositories
    /// are only counted.
    pub fn record_failure(mut self, limit: u32) -> (Traversal, Option<RepoRef>) {
        self.failed_attempts = self.failed_attempts.saturating_add(1);
        if self.failed_attempts < limit.max(1) {
            return (self, None);
        }
        match self.active.take() {
            Some(scan) => {
                self.failed_attempts = 0;
                (self.settle(), Some(scan.repo))
            }
            None => (self, None),
        }
    }

    /// Whether all work of the lineage is done.
    pub fn is_complete(&self) -> bool {
        self.active.is_none() && (self.exhausted || self.bound_reached())
    }

    /// Lowest repository id whose work is not yet fully recorded.
    ///
    /// Never decreases across [`Traversal::absorb`].
    pub fn frontier(&self) -> i64 {
        self.active
            .as_ref()
            .map(|scan| scan.repo.id)
            .or_else(|| self.queued.front().map(|repo| repo.id))
            .unwrap_or(self.next_start)
    }

    /// Name of the phase the lineage resumes in.
    pub fn discriminator(&self) -> &'static str {
        match &self.active {
            Some(scan) if !scan.awaiting_detail.is_empty() => FETCH_COMMIT_DETAIL,
            Some(_) => FETCH_COMMITS,
            None => SCAN_REPOSITORIES,
        }
    }

    /// Plan the next command.
    pub fn next_command(&self) -> Command {
        if let Some(scan) = &self.active {
            if let Some(sha) = scan.awaiting_detail.front() {
                return Command::FetchCommitDetail {
                    repo: scan.repo.clone(),
                    sha: sha.clone(),
                };
            }
            match &scan.paging {
                CommitPaging::Start => {
                    return Command::FetchCommitPage {
                        repo: scan.repo.clone(),
                        page: None,
                    };
                }
                CommitPaging::Next(page) => {
                    return Command::FetchCommitPage {
                        repo: scan.repo.clone(),
                        page: Some(page.clone()),
                    };
                }
                CommitPaging::Done => {}
            }
        }

        if self.is_complete() {
            Command::Stop
        } else {
            Command::FetchRepoPage {
                start_id: self.next_start,
            }
        }
    }

    /// Fold a response into the state.
    ///
    /// Returns the successor state and the rows to write before the successor
    /// counts as confirmed. With `hydrate`, listed commits are queued for a
    /// detail fetch instead of being written from the listing.
    pub fn absorb(mut self, event: Event, hydrate: bool) -> (Traversal, Vec<Command>) {
        let mut follow_ups = Vec::new();
        self.failed_attempts = 0;

        match event {
            Event::RepoPage(page) => {
                if page.is_empty() {
                    self.exhausted = true;
                }
                for payload in page {
                    if self.until.is_some_and(|until| payload.id >= until) {
                        self.exhausted = true;
                        break;
                    }
                    if payload.id < self.next_start {
                        continue;
                    }
                    follow_ups.push(Command::PersistRecord(Record::Repository(
                        mapper::repository_record(&payload),
                    )));
                    self.queued.push_back(RepoRef {
                        id: payload.id,
                        full_name: payload.full_name,
                    });
                    self.next_start = payload.id + 1;
                }
            }
            Event::CommitPage(page) => {
                if let Some(scan) = self.active.as_mut() {
                    for commit in &page.commits {
                        if hydrate {
                            scan.awaiting_detail.push_back(commit.sha.clone());
                        } else {
                            follow_ups.push(Command::PersistRecord(Record::Commit(
                                mapper::commit_record(scan.repo.id, commit),
                            )));
                        }
                    }
                    scan.paging = match page.next {
                        Some(next) => CommitPaging::Next(next),
                        None => CommitPaging::Done,
                    };
                }
            }
            Event::CommitDetail { sha, detail } => {
                if let Some(scan) = self.active.as_mut()
                    && scan.awaiting_detail.front() == Some(&sha)
                {
                    scan.awaiting_detail.pop_front();
                    if let Some(commit) = detail {
                        follow_ups.push(Command::PersistRecord(Record::Commit(
                            mapper::commit_record(scan.repo.id, &commit),
                        )));
                    }
                }
            }
        }

        (self.settle(), follow_ups)
    }

    /// Retire a finished scan and activate the next queued repository.
    fn settle(mut self) -> Self {
        while self.active.as_ref().is_none_or(CommitScan::finished) {
            match self.queued.pop_front() {
                Some(repo) => self.active = Some(CommitScan::new(repo)),
                None => {
                    self.active = None;
                    break;
                }
            }
        }
        self
    }

    fn bound_reached(&self) -> bool {
        self.until.is_some_and(|until| self.next_start >= until)
    }
}
