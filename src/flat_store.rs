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

//! Flat-file ledger store.
//!
//! Keeps the whole account tree in memory and rewrites the backing file on
//! every mutation. The layout mirrors the classic flat account store:
//!
//! ```json
//! {
//!   "accounts": {
//!     "<uuid>": {
//!       "created": 1735689600,
//!       "job": "miner",
//!       "jobnotifications": true,
//!       "balances": { "1": "100.00" },
//!       "jobstats": { "miner": { "level": 2, "exp": 40 } }
//!     }
//!   }
//! }
//! ```
//!
//! The synchronous full rewrite is slow in the absolute sense but well inside
//! the throughput ceiling of human player actions, and it keeps crash
//! behavior simple: the file is replaced atomically via a temp-file rename.

use crate::base::{AccountId, CurrencyId, JobId};
use crate::error::EconomyError;
use crate::store::{JobProgress, LedgerStore, unix_now};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobStatsNode {
    level: u32,
    exp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccountNode {
    created: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    job: Option<String>,
    #[serde(default = "default_true")]
    jobnotifications: bool,
    /// Balances keyed by currency id rendered as a string.
    #[serde(default)]
    balances: BTreeMap<String, Decimal>,
    #[serde(default)]
    jobstats: BTreeMap<String, JobStatsNode>,
}

impl AccountNode {
    fn new() -> Self {
        AccountNode {
            created: unix_now(),
            job: None,
            jobnotifications: true,
            balances: BTreeMap::new(),
            jobstats: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tree {
    #[serde(default)]
    accounts: BTreeMap<String, AccountNode>,
}

/// Flat hierarchical key-value store persisted as a single JSON file.
#[derive(Debug)]
pub struct FlatFileStore {
    path: Option<PathBuf>,
    tree: RwLock<Tree>,
}

impl FlatFileStore {
    /// Opens (or creates) the store file at `path`.
    pub fn open(path: &Path) -> Result<Self, EconomyError> {
        let tree = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str(&raw).map_err(|e| EconomyError::Persistence(e.to_string()))?
        } else {
            Tree::default()
        };
        Ok(FlatFileStore { path: Some(path.to_path_buf()), tree: RwLock::new(tree) })
    }

    /// In-memory store with no backing file (tests, throwaway servers).
    pub fn in_memory() -> Self {
        FlatFileStore { path: None, tree: RwLock::new(Tree::default()) }
    }

    /// Serializes the tree and atomically replaces the backing file.
    /// Called with the write lock held so concurrent mutations cannot
    /// interleave a stale snapshot.
    fn persist(&self, tree: &Tree) -> Result<(), EconomyError> {
        let Some(path) = &self.path else { return Ok(()) };
        let raw = serde_json::to_vec_pretty(tree)
            .map_err(|e| EconomyError::Persistence(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Applies a mutation to a working copy and commits it to memory only
    /// after the file write succeeds, so a failed persist leaves readers
    /// seeing the pre-mutation state.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Tree) -> Result<T, EconomyError>,
    ) -> Result<T, EconomyError> {
        let mut tree = self.tree.write();
        let mut next = tree.clone();
        let out = f(&mut next)?;
        self.persist(&next)?;
        *tree = next;
        Ok(out)
    }
}

impl LedgerStore for FlatFileStore {
    fn ensure_account(&self, account: AccountId) -> Result<(), EconomyError> {
        let key = account.to_string();
        if self.tree.read().accounts.contains_key(&key) {
            return Ok(());
        }
        self.mutate(|tree| {
            tree.accounts.entry(key).or_insert_with(AccountNode::new);
            Ok(())
        })
    }

    fn balance(
        &self,
        account: AccountId,
        currency: CurrencyId,
    ) -> Result<Option<Decimal>, EconomyError> {
        let tree = self.tree.read();
        Ok(tree
            .accounts
            .get(&account.to_string())
            .and_then(|node| node.balances.get(&currency.to_string()))
            .copied())
    }

    fn set_balance(
        &self,
        account: AccountId,
        currency: CurrencyId,
        amount: Decimal,
    ) -> Result<(), EconomyError> {
        self.mutate(|tree| {
            let node = tree
                .accounts
                .entry(account.to_string())
                .or_insert_with(AccountNode::new);
            node.balances.insert(currency.to_string(), amount);
            Ok(())
        })
    }

    fn job_of(&self, account: AccountId) -> Result<Option<JobId>, EconomyError> {
        let tree = self.tree.read();
        Ok(tree
            .accounts
            .get(&account.to_string())
            .and_then(|node| node.job.as_deref())
            .map(JobId::new))
    }

    fn set_job_of(&self, account: AccountId, job: &JobId) -> Result<(), EconomyError> {
        self.mutate(|tree| {
            let node = tree
                .accounts
                .entry(account.to_string())
                .or_insert_with(AccountNode::new);
            node.job = Some(job.as_str().to_string());
            Ok(())
        })
    }

    fn progress(
        &self,
        account: AccountId,
        job: &JobId,
    ) -> Result<Option<JobProgress>, EconomyError> {
        let tree = self.tree.read();
        Ok(tree
            .accounts
            .get(&account.to_string())
            .and_then(|node| node.jobstats.get(job.as_str()))
            .map(|stats| JobProgress { level: stats.level, experience: stats.exp }))
    }

    fn set_progress(
        &self,
        account: AccountId,
        job: &JobId,
        progress: JobProgress,
    ) -> Result<(), EconomyError> {
        self.mutate(|tree| {
            let node = tree
                .accounts
                .entry(account.to_string())
                .or_insert_with(AccountNode::new);
            node.jobstats.insert(
                job.as_str().to_string(),
                JobStatsNode { level: progress.level, exp: progress.experience },
            );
            Ok(())
        })
    }

    fn notifications_enabled(&self, account: AccountId) -> Result<bool, EconomyError> {
        let tree = self.tree.read();
        Ok(tree
            .accounts
            .get(&account.to_string())
            .map(|node| node.jobnotifications)
            .unwrap_or(true))
    }

    fn set_notifications_enabled(
        &self,
        account: AccountId,
        enabled: bool,
    ) -> Result<(), EconomyError> {
        self.mutate(|tree| {
            let node = tree
                .accounts
                .entry(account.to_string())
                .or_insert_with(AccountNode::new);
            node.jobnotifications = enabled;
            Ok(())
        })
    }

    fn accounts(&self) -> Result<Vec<AccountId>, EconomyError> {
        let tree = self.tree.read();
        tree.accounts
            .keys()
            .map(|key| {
                AccountId::from_str(key)
                    .map_err(|e| EconomyError::Persistence(format!("corrupt account key: {e}")))
            })
            .collect()
    }

    fn balances_of(
        &self,
        account: AccountId,
    ) -> Result<Vec<(CurrencyId, Decimal)>, EconomyError> {
        let tree = self.tree.read();
        let Some(node) = tree.accounts.get(&account.to_string()) else {
            return Ok(Vec::new());
        };
        node.balances
            .iter()
            .map(|(key, amount)| {
                key.parse::<i32>()
                    .map(|id| (CurrencyId(id), *amount))
                    .map_err(|e| EconomyError::Persistence(format!("corrupt currency key: {e}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn balance_absent_is_distinct_from_zero() {
        let store = FlatFileStore::in_memory();
        let account = AccountId::random();
        assert_eq!(store.balance(account, CurrencyId(1)).unwrap(), None);

        store.set_balance(account, CurrencyId(1), Decimal::ZERO).unwrap();
        assert_eq!(store.balance(account, CurrencyId(1)).unwrap(), Some(Decimal::ZERO));
    }

    #[test]
    fn progress_and_job_pointer_round_trip() {
        let store = FlatFileStore::in_memory();
        let account = AccountId::random();
        let miner = JobId::new("miner");

        assert_eq!(store.job_of(account).unwrap(), None);
        store.set_job_of(account, &miner).unwrap();
        assert_eq!(store.job_of(account).unwrap(), Some(miner.clone()));

        assert_eq!(store.progress(account, &miner).unwrap(), None);
        store
            .set_progress(account, &miner, JobProgress { level: 3, experience: 50 })
            .unwrap();
        assert_eq!(
            store.progress(account, &miner).unwrap(),
            Some(JobProgress { level: 3, experience: 50 })
        );
    }

    #[test]
    fn notifications_default_to_enabled() {
        let store = FlatFileStore::in_memory();
        let account = AccountId::random();
        assert!(store.notifications_enabled(account).unwrap());
        store.set_notifications_enabled(account, false).unwrap();
        assert!(!store.notifications_enabled(account).unwrap());
    }

    #[test]
    fn failed_persist_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        let account = AccountId::random();

        let store = FlatFileStore::open(&path).unwrap();
        store.set_balance(account, CurrencyId(1), dec!(100.00)).unwrap();

        // With the directory gone, the temp-file write must fail.
        drop(dir);
        let err = store.set_balance(account, CurrencyId(1), dec!(50.00)).unwrap_err();
        assert!(matches!(err, EconomyError::Persistence(_)));
        assert_eq!(store.balance(account, CurrencyId(1)).unwrap(), Some(dec!(100.00)));
    }

    #[test]
    fn file_round_trip_preserves_exact_amounts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        let account = AccountId::random();

        {
            let store = FlatFileStore::open(&path).unwrap();
            store.ensure_account(account).unwrap();
            store.set_balance(account, CurrencyId(1), dec!(123.45)).unwrap();
            store
                .set_progress(account, &JobId::new("miner"), JobProgress { level: 2, experience: 7 })
                .unwrap();
        }

        let reopened = FlatFileStore::open(&path).unwrap();
        assert_eq!(reopened.balance(account, CurrencyId(1)).unwrap(), Some(dec!(123.45)));
        assert_eq!(
            reopened.progress(account, &JobId::new("miner")).unwrap(),
            Some(JobProgress { level: 2, experience: 7 })
        );
        assert_eq!(reopened.accounts().unwrap(), vec![account]);
    }
}
