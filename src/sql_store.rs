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

//! SQLite ledger store.
//!
//! Row-level statements instead of the flat store's full-file rewrite.
//! Amounts are stored as TEXT holding the exact decimal rendering; SQLite has
//! no fixed-point column type and REAL would reintroduce the floating-point
//! drift this crate exists to avoid.

use crate::base::{AccountId, CurrencyId, JobId};
use crate::error::EconomyError;
use crate::store::{JobProgress, LedgerStore, unix_now};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    uid TEXT PRIMARY KEY,
    created INTEGER NOT NULL,
    job TEXT,
    job_notifications INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS balances (
    uid TEXT NOT NULL,
    currency INTEGER NOT NULL,
    balance TEXT NOT NULL,
    PRIMARY KEY (uid, currency)
);
CREATE TABLE IF NOT EXISTS jobs_progress (
    uid TEXT NOT NULL,
    job TEXT NOT NULL,
    level INTEGER NOT NULL,
    experience INTEGER NOT NULL,
    PRIMARY KEY (uid, job)
);
";

/// Relational ledger store backed by an embedded SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, EconomyError> {
        let conn = Connection::open(path)?;
        // WAL keeps readers unblocked during the ledger's serialized writes.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        let store = SqliteStore { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database (tests, throwaway servers).
    pub fn in_memory() -> Result<Self, EconomyError> {
        let store = SqliteStore { conn: Mutex::new(Connection::open_in_memory()?) };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), EconomyError> {
        self.conn.lock().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn parse_amount(raw: &str) -> Result<Decimal, EconomyError> {
        Decimal::from_str(raw)
            .map_err(|e| EconomyError::Persistence(format!("corrupt balance value '{raw}': {e}")))
    }
}

impl LedgerStore for SqliteStore {
    fn ensure_account(&self, account: AccountId) -> Result<(), EconomyError> {
        self.conn.lock().execute(
            "INSERT OR IGNORE INTO accounts (uid, created) VALUES (?1, ?2)",
            params![account.to_string(), unix_now()],
        )?;
        Ok(())
    }

    fn balance(
        &self,
        account: AccountId,
        currency: CurrencyId,
    ) -> Result<Option<Decimal>, EconomyError> {
        let raw: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT balance FROM balances WHERE uid = ?1 AND currency = ?2",
                params![account.to_string(), currency.0],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|value| Self::parse_amount(&value)).transpose()
    }

    fn set_balance(
        &self,
        account: AccountId,
        currency: CurrencyId,
        amount: Decimal,
    ) -> Result<(), EconomyError> {
        let affected = self.conn.lock().execute(
            "INSERT INTO balances (uid, currency, balance) VALUES (?1, ?2, ?3)
             ON CONFLICT (uid, currency) DO UPDATE SET balance = excluded.balance",
            params![account.to_string(), currency.0, amount.to_string()],
        )?;
        if affected != 1 {
            return Err(EconomyError::Persistence(format!(
                "balance write affected {affected} rows for account {account}"
            )));
        }
        Ok(())
    }

    fn job_of(&self, account: AccountId) -> Result<Option<JobId>, EconomyError> {
        let job: Option<Option<String>> = self
            .conn
            .lock()
            .query_row(
                "SELECT job FROM accounts WHERE uid = ?1",
                params![account.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(job.flatten().map(|name| JobId::new(&name)))
    }

    fn set_job_of(&self, account: AccountId, job: &JobId) -> Result<(), EconomyError> {
        self.ensure_account(account)?;
        let affected = self.conn.lock().execute(
            "UPDATE accounts SET job = ?2 WHERE uid = ?1",
            params![account.to_string(), job.as_str()],
        )?;
        if affected != 1 {
            return Err(EconomyError::Persistence(format!(
                "job update affected {affected} rows for account {account}"
            )));
        }
        Ok(())
    }

    fn progress(
        &self,
        account: AccountId,
        job: &JobId,
    ) -> Result<Option<JobProgress>, EconomyError> {
        let row: Option<(u32, u64)> = self
            .conn
            .lock()
            .query_row(
                "SELECT level, experience FROM jobs_progress WHERE uid = ?1 AND job = ?2",
                params![account.to_string(), job.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.map(|(level, experience)| JobProgress { level, experience }))
    }

    fn set_progress(
        &self,
        account: AccountId,
        job: &JobId,
        progress: JobProgress,
    ) -> Result<(), EconomyError> {
        let affected = self.conn.lock().execute(
            "INSERT INTO jobs_progress (uid, job, level, experience) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (uid, job) DO UPDATE
             SET level = excluded.level, experience = excluded.experience",
            params![account.to_string(), job.as_str(), progress.level, progress.experience],
        )?;
        if affected != 1 {
            return Err(EconomyError::Persistence(format!(
                "progress write affected {affected} rows for account {account}"
            )));
        }
        Ok(())
    }

    fn notifications_enabled(&self, account: AccountId) -> Result<bool, EconomyError> {
        let enabled: Option<bool> = self
            .conn
            .lock()
            .query_row(
                "SELECT job_notifications FROM accounts WHERE uid = ?1",
                params![account.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(enabled.unwrap_or(true))
    }

    fn set_notifications_enabled(
        &self,
        account: AccountId,
        enabled: bool,
    ) -> Result<(), EconomyError> {
        self.ensure_account(account)?;
        self.conn.lock().execute(
            "UPDATE accounts SET job_notifications = ?2 WHERE uid = ?1",
            params![account.to_string(), enabled],
        )?;
        Ok(())
    }

    fn accounts(&self) -> Result<Vec<AccountId>, EconomyError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT uid FROM accounts ORDER BY uid")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            let uid = row?;
            out.push(
                AccountId::from_str(&uid)
                    .map_err(|e| EconomyError::Persistence(format!("corrupt account uid: {e}")))?,
            );
        }
        Ok(out)
    }

    fn balances_of(
        &self,
        account: AccountId,
    ) -> Result<Vec<(CurrencyId, Decimal)>, EconomyError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT currency, balance FROM balances WHERE uid = ?1 ORDER BY currency")?;
        let rows = stmt.query_map(params![account.to_string()], |row| {
            Ok((row.get::<_, i32>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, raw) = row?;
            out.push((CurrencyId(id), Self::parse_amount(&raw)?));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn balance_absent_is_distinct_from_zero() {
        let store = SqliteStore::in_memory().unwrap();
        let account = AccountId::random();
        assert_eq!(store.balance(account, CurrencyId(1)).unwrap(), None);
        assert!(!store.has_balance(account, CurrencyId(1)).unwrap());

        store.set_balance(account, CurrencyId(1), Decimal::ZERO).unwrap();
        assert_eq!(store.balance(account, CurrencyId(1)).unwrap(), Some(Decimal::ZERO));
    }

    #[test]
    fn amounts_survive_text_round_trip_exactly() {
        let store = SqliteStore::in_memory().unwrap();
        let account = AccountId::random();
        store.set_balance(account, CurrencyId(1), dec!(0.01)).unwrap();
        assert_eq!(store.balance(account, CurrencyId(1)).unwrap(), Some(dec!(0.01)));

        store.set_balance(account, CurrencyId(1), dec!(9999999999.99)).unwrap();
        assert_eq!(
            store.balance(account, CurrencyId(1)).unwrap(),
            Some(dec!(9999999999.99))
        );
    }

    #[test]
    fn ensure_account_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        let account = AccountId::random();
        store.ensure_account(account).unwrap();
        store.ensure_account(account).unwrap();
        assert_eq!(store.accounts().unwrap(), vec![account]);
    }

    #[test]
    fn job_pointer_and_progress_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let account = AccountId::random();
        let miner = JobId::new("miner");

        assert_eq!(store.job_of(account).unwrap(), None);
        store.set_job_of(account, &miner).unwrap();
        assert_eq!(store.job_of(account).unwrap(), Some(miner.clone()));

        store
            .set_progress(account, &miner, JobProgress { level: 4, experience: 120 })
            .unwrap();
        assert_eq!(
            store.progress(account, &miner).unwrap(),
            Some(JobProgress { level: 4, experience: 120 })
        );
    }

    #[test]
    fn file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("economy.db");
        let account = AccountId::random();

        {
            let store = SqliteStore::open(&path).unwrap();
            store.ensure_account(account).unwrap();
            store.set_balance(account, CurrencyId(1), dec!(42.42)).unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.balance(account, CurrencyId(1)).unwrap(), Some(dec!(42.42)));
        assert_eq!(reopened.balances_of(account).unwrap(), vec![(CurrencyId(1), dec!(42.42))]);
    }
}
