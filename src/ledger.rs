// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Append-only transaction ledger.
//!
//! Provides a concurrent ledger that assigns globally unique, increasing
//! transaction IDs while keeping each user's records in insertion order.

use crate::PointError;
use crate::base::{TransactionId, UserId};
use crate::transaction::{Transaction, TransactionKind};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Append-only ledger persistence consumed by the engine.
///
/// No update or delete operation exists.
pub trait LedgerStore: Send + Sync {
    /// Records a transaction under the next sequence ID and returns it.
    fn append(
        &self,
        user_id: UserId,
        amount: i64,
        kind: TransactionKind,
        timestamp: i64,
    ) -> Result<Transaction, PointError>;

    /// Returns every transaction of `user_id` in insertion order.
    ///
    /// Users without transactions yield an empty vector.
    fn list_by_user(&self, user_id: UserId) -> Result<Vec<Transaction>, PointError>;
}

/// In-memory [`LedgerStore`].
///
/// Combines an atomic sequence counter with a [`DashMap`] of per-user
/// transaction lists.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    /// Last ID handed out; the first transaction gets ID 1.
    last_id: AtomicU64,

    /// Transactions grouped by user, in append order.
    by_user: DashMap<UserId, Vec<Transaction>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            last_id: AtomicU64::new(0),
            by_user: DashMap::new(),
        }
    }

    /// Total number of transactions across all users.
    pub fn len(&self) -> usize {
        self.by_user.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LedgerStore for InMemoryLedger {
    fn append(
        &self,
        user_id: UserId,
        amount: i64,
        kind: TransactionKind,
        timestamp: i64,
    ) -> Result<Transaction, PointError> {
        // The ID is drawn while the user's entry is held so that per-user
        // order always agrees with ID order.
        let mut records = self.by_user.entry(user_id).or_default();
        let id = TransactionId(self.last_id.fetch_add(1, Ordering::SeqCst) + 1);
        let transaction = Transaction {
            id,
            user_id,
            kind,
            amount,
            timestamp,
        };
        records.push(transaction);
        Ok(transaction)
    }

    fn list_by_user(&self, user_id: UserId) -> Result<Vec<Transaction>, PointError> {
        Ok(self
            .by_user
            .get(&user_id)
            .map(|records| records.value().clone())
            .unwrap_or_default())
    }
}
