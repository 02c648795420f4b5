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

//! Persistence abstraction shared by the account ledger and the job
//! progression tracker.
//!
//! Two backends implement this trait: a flat hierarchical tree rewritten to
//! disk on every mutation ([`FlatFileStore`](crate::flat_store::FlatFileStore))
//! and an embedded relational database
//! ([`SqliteStore`](crate::sql_store::SqliteStore)). The ledger and tracker
//! are written once against the trait; both backends give read-your-writes
//! within a single process.
//!
//! The store is deliberately dumb: amount scaling, cap enforcement, and
//! balance invariants live in [`AccountLedger`](crate::ledger::AccountLedger),
//! never here.

use crate::base::{AccountId, CurrencyId, JobId};
use crate::error::EconomyError;
use rust_decimal::Decimal;

/// Per-(account, job) progression row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobProgress {
    pub level: u32,
    pub experience: u64,
}

impl Default for JobProgress {
    fn default() -> Self {
        JobProgress { level: 1, experience: 0 }
    }
}

/// Persistence operations for balances, job pointers, and progression rows.
///
/// Implementations must be safe for concurrent use; callers serialize
/// read-modify-write cycles themselves (see the ledger's per-key locks), so
/// a store only needs each individual operation to be atomic.
pub trait LedgerStore: Send + Sync {
    /// Makes sure the account row exists, creating it with the current
    /// timestamp if absent. Idempotent.
    fn ensure_account(&self, account: AccountId) -> Result<(), EconomyError>;

    /// Returns the stored balance, or `None` if no row exists yet.
    /// Absence is distinct from a zero balance.
    fn balance(&self, account: AccountId, currency: CurrencyId)
    -> Result<Option<Decimal>, EconomyError>;

    /// Writes a balance, creating the row if absent. The amount is stored
    /// exactly as given; scaling happens at the ledger boundary.
    fn set_balance(
        &self,
        account: AccountId,
        currency: CurrencyId,
        amount: Decimal,
    ) -> Result<(), EconomyError>;

    fn has_balance(&self, account: AccountId, currency: CurrencyId) -> Result<bool, EconomyError> {
        Ok(self.balance(account, currency)?.is_some())
    }

    /// The account's active job pointer, if one has been assigned.
    fn job_of(&self, account: AccountId) -> Result<Option<JobId>, EconomyError>;

    fn set_job_of(&self, account: AccountId, job: &JobId) -> Result<(), EconomyError>;

    /// Progression row for `(account, job)`, or `None` if never created.
    fn progress(&self, account: AccountId, job: &JobId)
    -> Result<Option<JobProgress>, EconomyError>;

    /// Writes a progression row, creating it if absent. Must report
    /// [`EconomyError::Persistence`] when the write does not land.
    fn set_progress(
        &self,
        account: AccountId,
        job: &JobId,
        progress: JobProgress,
    ) -> Result<(), EconomyError>;

    /// Whether the account wants job notifications. Defaults to `true` for
    /// accounts that never toggled the flag.
    fn notifications_enabled(&self, account: AccountId) -> Result<bool, EconomyError>;

    fn set_notifications_enabled(
        &self,
        account: AccountId,
        enabled: bool,
    ) -> Result<(), EconomyError>;

    /// All known account ids, for reporting.
    fn accounts(&self) -> Result<Vec<AccountId>, EconomyError>;

    /// All balance rows held by one account.
    fn balances_of(&self, account: AccountId)
    -> Result<Vec<(CurrencyId, Decimal)>, EconomyError>;
}

/// Seconds since the Unix epoch, for account creation stamps.
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
