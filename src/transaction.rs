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

//! Ledger transaction records.
//!
//! Every accepted balance mutation is recorded as exactly one [`Transaction`]
//! whose [`TransactionKind`] and amount match the mutation.

use crate::base::{TransactionId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a balance mutation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    /// Points added to the balance.
    Charge,
    /// Points taken from the balance.
    Use,
}

impl TransactionKind {
    /// Signed change this kind applies to a balance for `amount`.
    pub fn delta(&self, amount: i64) -> i64 {
        match self {
            Self::Charge => amount,
            Self::Use => -amount,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Charge => f.write_str("CHARGE"),
            Self::Use => f.write_str("USE"),
        }
    }
}

/// An immutable ledger entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    /// Always positive; the sign comes from `kind`.
    pub amount: i64,
    /// Unix time in milliseconds.
    pub timestamp: i64,
}

impl Transaction {
    pub fn delta(&self) -> i64 {
        self.kind.delta(self.amount)
    }
}
