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

//! The transactional account ledger.
//!
//! Wraps a [`LedgerStore`] with deposit/withdraw/transfer/set-balance
//! operations that enforce non-negative balances, scale amounts to currency
//! precision, and respect the configured money cap.
//!
//! # Concurrency
//!
//! Every mutation is serialized per `(account, currency)` key through a
//! striped [`parking_lot::Mutex`] held in a [`DashMap`]. Reads take the same
//! key lock, so a transfer's withdraw-then-deposit pair is observed as atomic:
//! both keys are locked (in canonical order, which also rules out deadlock
//! between opposite-direction transfers) before either balance moves.
//!
//! Correctness is favored over throughput here: the domain's ceiling is human
//! player actions, so holding a key lock across a blocking store write is
//! acceptable.

use crate::base::{AccountId, CurrencyId};
use crate::currency::CurrencyRegistry;
use crate::error::EconomyError;
use crate::store::LedgerStore;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error};

/// How a successful mutation moved a balance, for event/audit purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Deposit,
    Withdraw,
    Transfer,
}

/// Outcome of a single-account mutation.
///
/// `amount` is always the delta applied, uniformly across operations;
/// `balance` carries the post-operation balance for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub account: AccountId,
    pub currency: CurrencyId,
    pub amount: Decimal,
    pub balance: Decimal,
    pub kind: TransactionKind,
}

/// Outcome of a two-account transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub from: AccountId,
    pub to: AccountId,
    pub currency: CurrencyId,
    pub amount: Decimal,
    pub from_balance: Decimal,
    pub to_balance: Decimal,
}

type Key = (AccountId, CurrencyId);

/// Transactional balance ledger over a pluggable store.
pub struct AccountLedger {
    store: Arc<dyn LedgerStore>,
    registry: Arc<CurrencyRegistry>,
    money_cap: Option<Decimal>,
    locks: DashMap<Key, Arc<Mutex<()>>>,
}

impl AccountLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        registry: Arc<CurrencyRegistry>,
        money_cap: Option<Decimal>,
    ) -> Self {
        AccountLedger { store, registry, money_cap, locks: DashMap::new() }
    }

    pub fn registry(&self) -> &CurrencyRegistry {
        &self.registry
    }

    fn key_lock(&self, key: Key) -> Arc<Mutex<()>> {
        self.locks.entry(key).or_default().clone()
    }

    fn exceeds_cap(&self, amount: Decimal) -> bool {
        self.money_cap.is_some_and(|cap| amount > cap)
    }

    /// Reads a balance under the key lock. `None` means no row exists yet.
    pub fn balance(
        &self,
        account: AccountId,
        currency: CurrencyId,
    ) -> Result<Option<Decimal>, EconomyError> {
        self.registry.require(currency)?;
        let lock = self.key_lock((account, currency));
        let _guard = lock.lock();
        self.store.balance(account, currency)
    }

    pub fn has_balance(
        &self,
        account: AccountId,
        currency: CurrencyId,
    ) -> Result<bool, EconomyError> {
        Ok(self.balance(account, currency)?.is_some())
    }

    /// Read-through-create: returns the balance, creating the account and a
    /// balance row at the currency's starting value on first touch.
    pub fn balance_or_create(
        &self,
        account: AccountId,
        currency: CurrencyId,
    ) -> Result<Decimal, EconomyError> {
        let spec = self.registry.require(currency)?;
        let starting = spec.truncate(spec.starting_balance);
        let lock = self.key_lock((account, currency));
        let _guard = lock.lock();
        if let Some(existing) = self.store.balance(account, currency)? {
            return Ok(existing);
        }
        self.store.ensure_account(account)?;
        self.store.set_balance(account, currency, starting)?;
        debug!(%account, %currency, %starting, "created balance row");
        Ok(starting)
    }

    /// Adds money to an existing balance.
    ///
    /// Fails with [`EconomyError::InvalidAmount`] for negative amounts,
    /// [`EconomyError::NoSuchBalance`] when no row exists for the currency,
    /// and [`EconomyError::AccountNoSpace`] when the result would exceed the
    /// money cap (nothing is written in that case).
    pub fn deposit(
        &self,
        account: AccountId,
        currency: CurrencyId,
        amount: Decimal,
    ) -> Result<Receipt, EconomyError> {
        let spec = self.registry.require(currency)?;
        if amount < Decimal::ZERO {
            return Err(EconomyError::InvalidAmount);
        }
        let amount = spec.truncate(amount);

        let lock = self.key_lock((account, currency));
        let _guard = lock.lock();
        let current = self
            .store
            .balance(account, currency)?
            .ok_or(EconomyError::NoSuchBalance)?;
        let new = current + amount;
        if self.exceeds_cap(new) {
            return Err(EconomyError::AccountNoSpace);
        }
        self.store.set_balance(account, currency, new)?;
        Ok(Receipt { account, currency, amount, balance: new, kind: TransactionKind::Deposit })
    }

    /// Removes money from an existing balance.
    ///
    /// Fails with [`EconomyError::InsufficientFunds`] when the result would
    /// go negative; the balance is untouched on any failure.
    pub fn withdraw(
        &self,
        account: AccountId,
        currency: CurrencyId,
        amount: Decimal,
    ) -> Result<Receipt, EconomyError> {
        let spec = self.registry.require(currency)?;
        if amount < Decimal::ZERO {
            return Err(EconomyError::InvalidAmount);
        }
        let amount = spec.truncate(amount);

        let lock = self.key_lock((account, currency));
        let _guard = lock.lock();
        let current = self
            .store
            .balance(account, currency)?
            .ok_or(EconomyError::NoSuchBalance)?;
        let new = current - amount;
        if new < Decimal::ZERO {
            return Err(EconomyError::InsufficientFunds);
        }
        self.store.set_balance(account, currency, new)?;
        Ok(Receipt { account, currency, amount, balance: new, kind: TransactionKind::Withdraw })
    }

    /// Overwrites a balance (admin operation).
    ///
    /// The amount is scaled to currency precision. When it exceeds the money
    /// cap the stored value is clamped to the cap and the call reports
    /// [`EconomyError::AccountNoSpace`] rather than silently dropping the
    /// overflow. The transaction kind is classified by the sign of the delta.
    pub fn set_balance(
        &self,
        account: AccountId,
        currency: CurrencyId,
        amount: Decimal,
    ) -> Result<Receipt, EconomyError> {
        let spec = self.registry.require(currency)?;
        if amount < Decimal::ZERO {
            return Err(EconomyError::InvalidAmount);
        }
        let requested = spec.truncate(amount);

        let lock = self.key_lock((account, currency));
        let _guard = lock.lock();
        let current = self
            .store
            .balance(account, currency)?
            .ok_or(EconomyError::NoSuchBalance)?;

        let clamped = self.exceeds_cap(requested);
        let new = if clamped {
            // money_cap is Some when exceeds_cap returns true
            spec.truncate(self.money_cap.unwrap_or(requested))
        } else {
            requested
        };

        self.store.set_balance(account, currency, new)?;

        if clamped {
            return Err(EconomyError::AccountNoSpace);
        }
        let delta = new - current;
        let kind = if delta >= Decimal::ZERO {
            TransactionKind::Deposit
        } else {
            TransactionKind::Withdraw
        };
        Ok(Receipt { account, currency, amount: delta, balance: new, kind })
    }

    /// Moves money between two accounts as one logical unit.
    ///
    /// Both key locks are taken (smaller key first) before either balance is
    /// read, so no concurrent reader can observe the money in flight and two
    /// opposite-direction transfers cannot deadlock.
    pub fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        currency: CurrencyId,
        amount: Decimal,
    ) -> Result<TransferReceipt, EconomyError> {
        let spec = self.registry.require(currency)?;
        if amount <= Decimal::ZERO {
            return Err(EconomyError::InvalidAmount);
        }
        if from == to {
            return Err(EconomyError::SelfTransfer);
        }
        let amount = spec.truncate(amount);

        let from_key = (from, currency);
        let to_key = (to, currency);
        let (first, second) = if from_key < to_key {
            (from_key, to_key)
        } else {
            (to_key, from_key)
        };
        let first_lock = self.key_lock(first);
        let second_lock = self.key_lock(second);
        let _first_guard = first_lock.lock();
        let _second_guard = second_lock.lock();

        let from_current = self
            .store
            .balance(from, currency)?
            .ok_or(EconomyError::NoSuchBalance)?;
        let to_current = self
            .store
            .balance(to, currency)?
            .ok_or(EconomyError::NoSuchBalance)?;

        let from_new = from_current - amount;
        if from_new < Decimal::ZERO {
            return Err(EconomyError::InsufficientFunds);
        }
        let to_new = to_current + amount;
        if self.exceeds_cap(to_new) {
            return Err(EconomyError::AccountNoSpace);
        }

        self.store.set_balance(from, currency, from_new)?;
        if let Err(err) = self.store.set_balance(to, currency, to_new) {
            // Compensate the completed withdrawal so a half-applied transfer
            // never survives a store failure.
            if let Err(undo) = self.store.set_balance(from, currency, from_current) {
                error!(%from, %to, %currency, %amount, %undo, "transfer compensation failed");
            }
            return Err(err);
        }

        Ok(TransferReceipt {
            from,
            to,
            currency,
            amount,
            from_balance: from_new,
            to_balance: to_new,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::CurrencyId;
    use crate::currency::Currency;
    use crate::flat_store::FlatFileStore;
    use rust_decimal_macros::dec;

    fn ledger(cap: Option<Decimal>) -> AccountLedger {
        let registry = CurrencyRegistry::new(vec![Currency {
            id: CurrencyId(1),
            singular: "Dollar".to_string(),
            plural: "Dollars".to_string(),
            symbol: "$".to_string(),
            fraction_digits: 2,
            is_default: true,
            starting_balance: dec!(100.00),
        }])
        .unwrap();
        AccountLedger::new(Arc::new(FlatFileStore::in_memory()), Arc::new(registry), cap)
    }

    const DOLLAR: CurrencyId = CurrencyId(1);

    #[test]
    fn deposit_requires_existing_balance_row() {
        let ledger = ledger(None);
        let account = AccountId::random();
        assert_eq!(
            ledger.deposit(account, DOLLAR, dec!(10)).unwrap_err(),
            EconomyError::NoSuchBalance
        );
    }

    #[test]
    fn deposit_truncates_to_currency_precision() {
        let ledger = ledger(None);
        let account = AccountId::random();
        ledger.balance_or_create(account, DOLLAR).unwrap();

        let receipt = ledger.deposit(account, DOLLAR, dec!(0.999)).unwrap();
        assert_eq!(receipt.amount, dec!(0.99));
        assert_eq!(receipt.balance, dec!(100.99));
        assert_eq!(receipt.kind, TransactionKind::Deposit);
    }

    #[test]
    fn withdraw_cannot_go_negative() {
        let ledger = ledger(None);
        let account = AccountId::random();
        ledger.balance_or_create(account, DOLLAR).unwrap();

        let err = ledger.withdraw(account, DOLLAR, dec!(100.01)).unwrap_err();
        assert_eq!(err, EconomyError::InsufficientFunds);
        assert_eq!(ledger.balance(account, DOLLAR).unwrap(), Some(dec!(100.00)));

        let receipt = ledger.withdraw(account, DOLLAR, dec!(100.00)).unwrap();
        assert_eq!(receipt.balance, Decimal::ZERO);
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let ledger = ledger(None);
        let account = AccountId::random();
        ledger.balance_or_create(account, DOLLAR).unwrap();

        assert_eq!(
            ledger.deposit(account, DOLLAR, dec!(-1)).unwrap_err(),
            EconomyError::InvalidAmount
        );
        assert_eq!(
            ledger.withdraw(account, DOLLAR, dec!(-1)).unwrap_err(),
            EconomyError::InvalidAmount
        );
        assert_eq!(
            ledger.set_balance(account, DOLLAR, dec!(-1)).unwrap_err(),
            EconomyError::InvalidAmount
        );
    }

    #[test]
    fn deposit_rejects_past_money_cap() {
        let ledger = ledger(Some(dec!(150.00)));
        let account = AccountId::random();
        ledger.balance_or_create(account, DOLLAR).unwrap();

        assert_eq!(
            ledger.deposit(account, DOLLAR, dec!(60.00)).unwrap_err(),
            EconomyError::AccountNoSpace
        );
        // Nothing written on rejection.
        assert_eq!(ledger.balance(account, DOLLAR).unwrap(), Some(dec!(100.00)));
    }

    #[test]
    fn set_balance_clamps_to_cap_and_reports() {
        let ledger = ledger(Some(dec!(150.00)));
        let account = AccountId::random();
        ledger.balance_or_create(account, DOLLAR).unwrap();

        let err = ledger.set_balance(account, DOLLAR, dec!(1000.00)).unwrap_err();
        assert_eq!(err, EconomyError::AccountNoSpace);
        assert_eq!(ledger.balance(account, DOLLAR).unwrap(), Some(dec!(150.00)));
    }

    #[test]
    fn set_balance_is_idempotent_and_classified_by_delta() {
        let ledger = ledger(None);
        let account = AccountId::random();
        ledger.balance_or_create(account, DOLLAR).unwrap();

        let receipt = ledger.set_balance(account, DOLLAR, dec!(250.555)).unwrap();
        assert_eq!(receipt.kind, TransactionKind::Deposit);
        assert_eq!(receipt.balance, dec!(250.55));

        let receipt = ledger.set_balance(account, DOLLAR, dec!(250.555)).unwrap();
        assert_eq!(receipt.amount, Decimal::ZERO);
        assert_eq!(receipt.balance, dec!(250.55));

        let receipt = ledger.set_balance(account, DOLLAR, dec!(10.00)).unwrap();
        assert_eq!(receipt.kind, TransactionKind::Withdraw);
        assert_eq!(receipt.amount, dec!(-240.55));
    }

    #[test]
    fn transfer_moves_exact_amount() {
        let ledger = ledger(None);
        let a = AccountId::random();
        let b = AccountId::random();
        ledger.balance_or_create(a, DOLLAR).unwrap();
        ledger.balance_or_create(b, DOLLAR).unwrap();

        let receipt = ledger.transfer(a, b, DOLLAR, dec!(10.00)).unwrap();
        assert_eq!(receipt.from_balance, dec!(90.00));
        assert_eq!(receipt.to_balance, dec!(110.00));
        assert_eq!(ledger.balance(a, DOLLAR).unwrap(), Some(dec!(90.00)));
        assert_eq!(ledger.balance(b, DOLLAR).unwrap(), Some(dec!(110.00)));
    }

    #[test]
    fn transfer_fails_fast_on_bad_input() {
        let ledger = ledger(None);
        let a = AccountId::random();
        let b = AccountId::random();
        ledger.balance_or_create(a, DOLLAR).unwrap();

        assert_eq!(
            ledger.transfer(a, b, DOLLAR, Decimal::ZERO).unwrap_err(),
            EconomyError::InvalidAmount
        );
        assert_eq!(
            ledger.transfer(a, a, DOLLAR, dec!(1)).unwrap_err(),
            EconomyError::SelfTransfer
        );
        // b has no balance row: nothing changes.
        assert_eq!(
            ledger.transfer(a, b, DOLLAR, dec!(10.00)).unwrap_err(),
            EconomyError::NoSuchBalance
        );
        assert_eq!(ledger.balance(a, DOLLAR).unwrap(), Some(dec!(100.00)));
    }
}
