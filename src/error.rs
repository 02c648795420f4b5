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

//! Error types for economy operations.
//!
//! Business-rule failures (insufficient funds, money cap) and system faults
//! (persistence, configuration) share one enum so every public operation can
//! return a plain `Result` that never panics past the core boundary.

use thiserror::Error;

/// Economy operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EconomyError {
    /// Amount is negative where only non-negative amounts are allowed
    #[error("invalid amount (must not be negative)")]
    InvalidAmount,

    /// Withdrawal or transfer would push the source balance below zero
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Deposit or set-balance would exceed the configured money cap
    #[error("balance would exceed the money cap")]
    AccountNoSpace,

    /// No balance row exists for this account/currency combination
    #[error("no balance exists for this account and currency")]
    NoSuchBalance,

    /// Currency id is not present in the registry
    #[error("unknown currency id {0}")]
    UnknownCurrency(i32),

    /// Job name is not present in the catalog
    #[error("unknown job '{0}'")]
    UnknownJob(String),

    /// Source and destination of a transfer are the same account
    #[error("cannot transfer to the same account")]
    SelfTransfer,

    /// Account does not meet the level requirement to take a job
    #[error("requires level {level} in the '{job}' job")]
    RequirementNotMet { job: String, level: u32 },

    /// Underlying store I/O failure (file write, SQL statement)
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Catalog or settings failed validation; previous state remains active
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<rusqlite::Error> for EconomyError {
    fn from(err: rusqlite::Error) -> Self {
        EconomyError::Persistence(err.to_string())
    }
}

impl From<std::io::Error> for EconomyError {
    fn from(err: std::io::Error) -> Self {
        EconomyError::Persistence(err.to_string())
    }
}
