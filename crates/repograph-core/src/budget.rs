// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-execution call budget.
//!
//! The budget is fetched fresh from the platform at the start of every
//! execution and never persisted. A reserved floor is held back so other
//! consumers of the same token are not starved.

/// Remaining external calls for one execution, with a reserved floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBudget {
    remaining: u32,
    floor: u32,
    charged: u32,
}

impl RateBudget {
    /// Create a budget from the platform-reported remaining count.
    pub fn new(remaining: u32, floor: u32) -> Self {
        Self {
            remaining,
            floor,
            charged: 0,
        }
    }

    /// Calls still available, floor included.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// The reserved floor.
    pub fn floor(&self) -> u32 {
        self.floor
    }

    /// Calls charged so far.
    pub fn charged(&self) -> u32 {
        self.charged
    }

    /// Calls that can still be charged before hitting the floor.
    pub fn spendable(&self) -> u32 {
        self.remaining.saturating_sub(self.floor)
    }

    /// Charge `n` calls.
    ///
    /// Returns false, leaving the counter unchanged, if the charge would take
    /// the budget below the floor.
    pub fn charge(&mut self, n: u32) -> bool {
        if n > self.spendable() {
            return false;
        }
        self.remaining -= n;
        self.charged += n;
        true
    }
}
