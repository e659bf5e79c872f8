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

//! Per-user locks.
//!
//! The [`LockRegistry`] hands out one [`UserLock`] per user key, creating it on
//! first request. Every mutating engine operation for a key resolves to the
//! same lock instance, so read-modify-write windows on one key never overlap
//! while different keys proceed independently.
//!
//! # Example
//!
//! ```
//! use point_ledger_rs::{LockRegistry, UserId};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let registry = LockRegistry::new();
//! let lock = registry.get_lock(UserId(1));
//! assert!(Arc::ptr_eq(&lock, &registry.get_lock(UserId(1))));
//!
//! let guard = lock.acquire(Duration::from_millis(10)).unwrap();
//! assert!(lock.is_locked());
//! guard.release();
//! assert!(!lock.is_locked());
//! ```

use crate::PointError;
use crate::base::UserId;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Exclusive lock for a single user key with bounded-wait acquisition.
#[derive(Debug)]
pub struct UserLock {
    user_id: UserId,
    mutex: Mutex<()>,
}

impl UserLock {
    fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            mutex: Mutex::new(()),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Blocks until the lock is free or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`PointError::LockTimeout`] if another holder kept the lock for
    /// the whole `timeout`.
    pub fn acquire(&self, timeout: Duration) -> Result<UserLockGuard<'_>, PointError> {
        let started = Instant::now();
        match self.mutex.try_lock_for(timeout) {
            Some(guard) => {
                tracing::trace!(user_id = %self.user_id, waited = ?started.elapsed(), "lock acquired");
                Ok(UserLockGuard {
                    user_id: self.user_id,
                    _guard: guard,
                })
            }
            None => Err(PointError::LockTimeout {
                user_id: self.user_id,
                waited_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.mutex.is_locked()
    }
}

/// Proof of holding a [`UserLock`]. The lock is released when the guard is
/// dropped, whichever way the critical section exits.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct UserLockGuard<'a> {
    user_id: UserId,
    _guard: MutexGuard<'a, ()>,
}

impl UserLockGuard<'_> {
    /// Releases the lock now instead of at the end of the scope.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for UserLockGuard<'_> {
    fn drop(&mut self) {
        tracing::trace!(user_id = %self.user_id, "lock released");
    }
}

/// Shared map from user key to its [`UserLock`].
///
/// Locks are created lazily and, unless [`prune_idle`](Self::prune_idle) is
/// called, live as long as the registry.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: DashMap<UserId, Arc<UserLock>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Returns the lock for `user_id`, creating a free one on first use.
    ///
    /// Repeated calls for the same key return the same instance, including
    /// when several threads race on the first call.
    pub fn get_lock(&self, user_id: UserId) -> Arc<UserLock> {
        self.locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(UserLock::new(user_id)))
            .value()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Drops locks that nobody holds or references and returns how many were
    /// removed.
    ///
    /// A lock still referenced outside the registry is kept, so a caller that
    /// already resolved a key keeps sharing its lock with later callers.
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        self.locks
            .retain(|_, lock| Arc::strong_count(lock) > 1 || lock.is_locked());
        let removed = before.saturating_sub(self.locks.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.locks.len(), "pruned idle user locks");
        }
        removed
    }
}
