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

//! Point balance engine.
//!
//! The [`PointEngine`] is the central component that applies charges and uses to
//! user balances and records each accepted mutation in the ledger.
//!
//! # Operation Flow
//!
//! A mutating operation runs through
//! `validate -> acquire lock -> read balance -> compute -> check limits ->
//! write balance -> append ledger -> release lock`.
//! The lock is held by a guard, so it is released on every exit path. A
//! failure before the balance write leaves both stores untouched.
//!
//! # Thread Safety
//!
//! Mutations of one user are serialized by that user's lock from the shared
//! [`LockRegistry`]. There is no engine-wide lock, so operations on different
//! users run in parallel. Reads take no lock and may observe a snapshot that
//! is about to be replaced.

use crate::PointError;
use crate::balance::{BalanceStore, InMemoryBalanceStore, UserBalance};
use crate::base::UserId;
use crate::config::{EngineConfig, UnknownUserPolicy};
use crate::ledger::{InMemoryLedger, LedgerStore};
use crate::lock::LockRegistry;
use crate::transaction::{Transaction, TransactionKind};
use std::sync::Arc;

/// Balance engine over a [`BalanceStore`] and a [`LedgerStore`].
///
/// # Invariants
///
/// - `0 <= point <= config.max_balance` for every stored balance.
/// - Every balance change is matched by exactly one ledger transaction of the
///   same kind and amount.
/// - Read-modify-write windows of one user never overlap.
pub struct PointEngine<B = InMemoryBalanceStore, L = InMemoryLedger> {
    balances: B,
    ledger: L,
    locks: Arc<LockRegistry>,
    config: EngineConfig,
}

impl PointEngine {
    /// Creates an engine with empty in-memory stores and the default limits.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an engine with empty in-memory stores and the given limits.
    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_parts(
            InMemoryBalanceStore::new(),
            InMemoryLedger::new(),
            Arc::new(LockRegistry::new()),
            config,
        )
    }
}

impl Default for PointEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: BalanceStore, L: LedgerStore> PointEngine<B, L> {
    /// Assembles an engine from explicit stores and a lock registry.
    ///
    /// Engines that must serialize against each other have to share the same
    /// `locks` registry.
    pub fn with_parts(
        balances: B,
        ledger: L,
        locks: Arc<LockRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            balances,
            ledger,
            locks,
            config,
        }
    }

    pub fn balances(&self) -> &B {
        &self.balances
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn locks(&self) -> &Arc<LockRegistry> {
        &self.locks
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Adds `amount` points to the user's balance.
    ///
    /// # Errors
    ///
    /// - [`PointError::InvalidUserId`] - `user_id` is not positive.
    /// - [`PointError::InvalidAmount`] - `amount` is not positive.
    /// - [`PointError::LockTimeout`] - the user's lock stayed busy for the configured timeout.
    /// - [`PointError::UserNotFound`] - unknown user under [`UnknownUserPolicy::Reject`].
    /// - [`PointError::BalanceCeilingExceeded`] - the new balance would pass `max_balance`.
    /// - [`PointError::Storage`] - a store failed; no partial update is left behind.
    pub fn charge(&self, user_id: UserId, amount: i64) -> Result<UserBalance, PointError> {
        self.apply(user_id, amount, TransactionKind::Charge)
    }

    /// Takes `amount` points from the user's balance.
    ///
    /// # Errors
    ///
    /// Same as [`charge`](Self::charge), except that the limit check fails with
    /// [`PointError::InsufficientBalance`] when `amount` exceeds the balance.
    pub fn use_points(&self, user_id: UserId, amount: i64) -> Result<UserBalance, PointError> {
        self.apply(user_id, amount, TransactionKind::Use)
    }

    /// Returns the user's current balance without taking the lock.
    ///
    /// A stored balance outside `0..=max_balance` is reported as
    /// [`PointError::Storage`], here and in [`charge`](Self::charge) and
    /// [`use_points`](Self::use_points).
    pub fn balance(&self, user_id: UserId) -> Result<UserBalance, PointError> {
        validate_user(user_id)?;
        self.load(user_id, now_millis())
    }

    /// Returns the user's transactions in the order they were applied.
    pub fn history(&self, user_id: UserId) -> Result<Vec<Transaction>, PointError> {
        validate_user(user_id)?;
        self.ledger.list_by_user(user_id)
    }

    fn apply(
        &self,
        user_id: UserId,
        amount: i64,
        kind: TransactionKind,
    ) -> Result<UserBalance, PointError> {
        validate_user(user_id)?;
        if amount <= 0 {
            return Err(PointError::InvalidAmount);
        }

        let lock = self.locks.get_lock(user_id);
        let guard = lock.acquire(self.config.lock_timeout).inspect_err(|e| {
            tracing::warn!(%user_id, %kind, amount, error = %e, "lock acquisition failed");
        })?;

        let now = now_millis();
        let current = self.load(user_id, now)?;
        let point = self.next_point(current.point, amount, kind)?;
        // Never move a user's update time backwards, even if the clock does.
        let timestamp = now.max(current.updated_at);

        let updated = self.balances.put(user_id, point, timestamp)?;
        if let Err(error) = self.ledger.append(user_id, amount, kind, timestamp) {
            tracing::warn!(%user_id, %kind, amount, %error, "ledger append failed, restoring balance");
            let restored = self.balances.put(user_id, current.point, current.updated_at);
            if let Err(rollback) = restored {
                tracing::error!(%user_id, error = %rollback, "balance rollback failed");
            }
            return Err(error);
        }

        guard.release();
        tracing::debug!(%user_id, %kind, amount, point = updated.point, "balance updated");
        Ok(updated)
    }

    fn next_point(
        &self,
        current: i64,
        amount: i64,
        kind: TransactionKind,
    ) -> Result<i64, PointError> {
        match kind {
            TransactionKind::Charge => current
                .checked_add(amount)
                .filter(|point| *point <= self.config.max_balance)
                .ok_or(PointError::BalanceCeilingExceeded {
                    max: self.config.max_balance,
                }),
            TransactionKind::Use => {
                if amount > current {
                    Err(PointError::InsufficientBalance)
                } else {
                    Ok(current - amount)
                }
            }
        }
    }

    fn load(&self, user_id: UserId, now: i64) -> Result<UserBalance, PointError> {
        match self.balances.get(user_id)? {
            Some(balance) if (0..=self.config.max_balance).contains(&balance.point) => {
                Ok(balance)
            }
            Some(balance) => {
                tracing::error!(
                    %user_id,
                    point = balance.point,
                    max = self.config.max_balance,
                    "stored balance out of range"
                );
                Err(PointError::Storage(format!(
                    "stored balance {} of user {} is outside 0..={}",
                    balance.point, user_id, self.config.max_balance
                )))
            }
            None => match self.config.unknown_user {
                UnknownUserPolicy::DefaultZero => Ok(UserBalance::empty(user_id, now)),
                UnknownUserPolicy::Reject => Err(PointError::UserNotFound),
            },
        }
    }
}

fn validate_user(user_id: UserId) -> Result<(), PointError> {
    if user_id.is_valid() {
        Ok(())
    } else {
        Err(PointError::InvalidUserId)
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
