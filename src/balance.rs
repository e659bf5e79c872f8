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

//! Balance storage.
//!
//! A [`BalanceStore`] maps a user key to its current [`UserBalance`]. Stores only
//! guarantee that a single `get` or `put` is atomic; serializing a
//! read-modify-write is the job of [`PointEngine`](crate::PointEngine).
//!
//! # Example
//!
//! ```
//! use point_ledger_rs::{BalanceStore, InMemoryBalanceStore, UserId};
//!
//! let store = InMemoryBalanceStore::new();
//! assert!(store.get(UserId(1)).unwrap().is_none());
//!
//! let balance = store.put(UserId(1), 1_000, 1).unwrap();
//! assert_eq!(balance.point, 1_000);
//! ```

use crate::PointError;
use crate::base::UserId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Snapshot of a user's point balance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserBalance {
    pub user_id: UserId,
    pub point: i64,
    /// Unix time in milliseconds of the last write.
    pub updated_at: i64,
}

impl UserBalance {
    /// Balance of a user that was never written.
    pub fn empty(user_id: UserId, now: i64) -> Self {
        Self {
            user_id,
            point: 0,
            updated_at: now,
        }
    }
}

/// Key-to-balance persistence consumed by the engine.
pub trait BalanceStore: Send + Sync {
    /// Returns the stored balance, or `None` if the user was never written.
    fn get(&self, user_id: UserId) -> Result<Option<UserBalance>, PointError>;

    /// Replaces the stored balance and returns the new snapshot.
    fn put(&self, user_id: UserId, point: i64, updated_at: i64)
    -> Result<UserBalance, PointError>;
}

/// In-memory [`BalanceStore`] backed by a [`DashMap`].
#[derive(Debug, Default)]
pub struct InMemoryBalanceStore {
    balances: DashMap<UserId, UserBalance>,
}

impl InMemoryBalanceStore {
    pub fn new() -> Self {
        Self {
            balances: DashMap::new(),
        }
    }

    /// Creates a store pre-populated with `(user, point)` pairs stamped at time 0.
    pub fn with_balances(balances: impl IntoIterator<Item = (UserId, i64)>) -> Self {
        let store = Self::new();
        for (user_id, point) in balances {
            store.balances.insert(
                user_id,
                UserBalance {
                    user_id,
                    point,
                    updated_at: 0,
                },
            );
        }
        store
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    /// Copies out every stored balance, ordered by user key.
    pub fn snapshot(&self) -> Vec<UserBalance> {
        let mut balances: Vec<UserBalance> =
            self.balances.iter().map(|entry| *entry.value()).collect();
        balances.sort_by_key(|balance| balance.user_id);
        balances
    }
}

impl BalanceStore for InMemoryBalanceStore {
    fn get(&self, user_id: UserId) -> Result<Option<UserBalance>, PointError> {
        Ok(self.balances.get(&user_id).map(|entry| *entry.value()))
    }

    fn put(
        &self,
        user_id: UserId,
        point: i64,
        updated_at: i64,
    ) -> Result<UserBalance, PointError> {
        let balance = UserBalance {
            user_id,
            point,
            updated_at,
        };
        self.balances.insert(user_id, balance);
        Ok(balance)
    }
}
