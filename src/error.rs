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

//! Error types for point balance operations.

use crate::base::UserId;
use thiserror::Error;

/// Point balance operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PointError {
    /// User key is zero or negative
    #[error("invalid user id (must be positive)")]
    InvalidUserId,

    /// Amount is zero or negative
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// Use would drive the balance below zero
    #[error("insufficient point balance")]
    InsufficientBalance,

    /// Charge would push the balance above the configured ceiling
    #[error("balance would exceed the maximum of {max} points")]
    BalanceCeilingExceeded { max: i64 },

    /// The user's lock could not be acquired in time
    #[error("timed out after {waited_ms}ms waiting for the lock of user {user_id}")]
    LockTimeout { user_id: UserId, waited_ms: u64 },

    /// User has no balance and the engine does not create one implicitly
    #[error("user not found")]
    UserNotFound,

    /// A balance or ledger store failed
    #[error("storage failure: {0}")]
    Storage(String),
}

impl PointError {
    /// Returns `true` for transient failures the caller may retry with a fresh attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PointError::LockTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        assert_eq!(
            PointError::InvalidUserId.to_string(),
            "invalid user id (must be positive)"
        );
        assert_eq!(
            PointError::InvalidAmount.to_string(),
            "invalid amount (must be positive)"
        );
        assert_eq!(
            PointError::InsufficientBalance.to_string(),
            "insufficient point balance"
        );
        assert_eq!(
            PointError::BalanceCeilingExceeded { max: 2_000_000 }.to_string(),
            "balance would exceed the maximum of 2000000 points"
        );
        assert_eq!(
            PointError::LockTimeout {
                user_id: UserId(7),
                waited_ms: 50
            }
            .to_string(),
            "timed out after 50ms waiting for the lock of user 7"
        );
        assert_eq!(PointError::UserNotFound.to_string(), "user not found");
        assert_eq!(
            PointError::Storage("disk full".into()).to_string(),
            "storage failure: disk full"
        );
    }

    #[test]
    fn only_lock_timeout_is_retryable() {
        assert!(
            PointError::LockTimeout {
                user_id: UserId(1),
                waited_ms: 10
            }
            .is_retryable()
        );
        assert!(!PointError::InvalidAmount.is_retryable());
        assert!(!PointError::InsufficientBalance.is_retryable());
        assert!(!PointError::BalanceCeilingExceeded { max: 1 }.is_retryable());
        assert!(!PointError::Storage("x".into()).is_retryable());
    }

    #[test]
    fn errors_are_cloneable() {
        let error = PointError::InsufficientBalance;
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }
}
