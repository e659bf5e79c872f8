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

//! Engine configuration.
//!
//! Defaults mirror the reference behavior: a 2,000,000 point ceiling, a 50 second
//! lock timeout and implicit zero balances for users that were never charged.

use std::time::Duration;

/// How the engine treats a user key with no stored balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownUserPolicy {
    /// Unseen users have a zero balance and are created by their first charge.
    #[default]
    DefaultZero,
    /// Unseen users fail with [`PointError::UserNotFound`](crate::PointError::UserNotFound).
    Reject,
}

impl UnknownUserPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "zero" | "default_zero" => Some(Self::DefaultZero),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Limits and policies applied by [`PointEngine`](crate::PointEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Highest balance a user may hold.
    pub max_balance: i64,
    /// How long a mutating operation waits for the user's lock.
    pub lock_timeout: Duration,
    /// Policy for users with no stored balance.
    pub unknown_user: UnknownUserPolicy,
}

impl EngineConfig {
    pub const DEFAULT_MAX_BALANCE: i64 = 2_000_000;
    pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(50);

    /// Loads configuration from `POINT_MAX_BALANCE`, `POINT_LOCK_TIMEOUT_MS` and
    /// `POINT_UNKNOWN_USER`, keeping the default for any variable that is
    /// missing or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_balance: lookup("POINT_MAX_BALANCE")
                .and_then(|s| s.trim().parse().ok())
                .filter(|max: &i64| *max >= 0)
                .unwrap_or(defaults.max_balance),
            lock_timeout: lookup("POINT_LOCK_TIMEOUT_MS")
                .and_then(|s| s.trim().parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
            unknown_user: lookup("POINT_UNKNOWN_USER")
                .and_then(|s| UnknownUserPolicy::parse(&s))
                .unwrap_or(defaults.unknown_user),
        }
    }

    /// Sets the ceiling. Negative values are ignored, as in [`from_env`](Self::from_env).
    pub fn with_max_balance(mut self, max_balance: i64) -> Self {
        if max_balance >= 0 {
            self.max_balance = max_balance;
        } else {
            tracing::warn!(max_balance, "ignoring negative balance ceiling");
        }
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn with_unknown_user(mut self, policy: UnknownUserPolicy) -> Self {
        self.unknown_user = policy;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_balance: Self::DEFAULT_MAX_BALANCE,
            lock_timeout: Self::DEFAULT_LOCK_TIMEOUT,
            unknown_user: UnknownUserPolicy::DefaultZero,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_limits() {
        let config = EngineConfig::default();
        assert_eq!(config.max_balance, 2_000_000);
        assert_eq!(config.lock_timeout, Duration::from_secs(50));
        assert_eq!(config.unknown_user, UnknownUserPolicy::DefaultZero);
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("POINT_MAX_BALANCE", "5000"),
            ("POINT_LOCK_TIMEOUT_MS", "250"),
            ("POINT_UNKNOWN_USER", " Reject "),
        ]));
        assert_eq!(config.max_balance, 5000);
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
        assert_eq!(config.unknown_user, UnknownUserPolicy::Reject);
    }

    #[test]
    fn unparsable_values_fall_back_to_defaults() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("POINT_MAX_BALANCE", "-1"),
            ("POINT_LOCK_TIMEOUT_MS", "soon"),
            ("POINT_UNKNOWN_USER", "maybe"),
        ]));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn negative_ceiling_is_ignored() {
        let config = EngineConfig::default().with_max_balance(-5);
        assert_eq!(config.max_balance, EngineConfig::DEFAULT_MAX_BALANCE);

        let config = EngineConfig::default().with_max_balance(0);
        assert_eq!(config.max_balance, 0);
    }

    #[test]
    fn builder_methods_replace_fields() {
        let config = EngineConfig::default()
            .with_max_balance(10)
            .with_lock_timeout(Duration::from_millis(5))
            .with_unknown_user(UnknownUserPolicy::Reject);
        assert_eq!(config.max_balance, 10);
        assert_eq!(config.lock_timeout, Duration::from_millis(5));
        assert_eq!(config.unknown_user, UnknownUserPolicy::Reject);
    }
}
