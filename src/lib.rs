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

//! # Point Ledger
//!
//! This library keeps a per-user point balance together with an append-only
//! ledger of every charge and use, and stays correct when many callers act on
//! the same user at once.
//!
//! ## Core Components
//!
//! - [`PointEngine`]: Applies charges and uses under a per-user lock
//! - [`BalanceStore`] / [`InMemoryBalanceStore`]: Current balance per user
//! - [`LedgerStore`] / [`InMemoryLedger`]: Append-only transaction history
//! - [`LockRegistry`]: Lazily created, timeout-bounded lock per user
//! - [`PointError`]: Error types for rejected operations
//!
//! ## Example
//!
//! ```
//! use point_ledger_rs::{PointEngine, PointError, TransactionKind, UserId};
//!
//! let engine = PointEngine::new();
//!
//! engine.charge(UserId(1), 1_000).unwrap();
//! let balance = engine.use_points(UserId(1), 400).unwrap();
//! assert_eq!(balance.point, 600);
//!
//! assert_eq!(
//!     engine.use_points(UserId(1), 5_000),
//!     Err(PointError::InsufficientBalance)
//! );
//!
//! let history = engine.history(UserId(1)).unwrap();
//! assert_eq!(history.len(), 2);
//! assert_eq!(history[1].kind, TransactionKind::Use);
//! ```
//!
//! ## Thread Safety
//!
//! Mutations of the same user are serialized through that user's lock, while
//! different users never wait on each other. Share one engine behind an
//! [`Arc`](std::sync::Arc) across threads.

pub mod balance;
mod base;
pub mod config;
mod engine;
pub mod error;
pub mod ledger;
pub mod lock;
mod transaction;

pub use balance::{BalanceStore, InMemoryBalanceStore, UserBalance};
pub use base::{TransactionId, UserId};
pub use config::{EngineConfig, UnknownUserPolicy};
pub use engine::PointEngine;
pub use error::PointError;
pub use ledger::{InMemoryLedger, LedgerStore};
pub use lock::{LockRegistry, UserLock, UserLockGuard};
pub use transaction::{Transaction, TransactionKind};
