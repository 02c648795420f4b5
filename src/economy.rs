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

//! The economy facade: one object wiring the store, ledger, catalog,
//! progression tracker, dispatcher, and salary scheduler together.
//!
//! This is the surface a host embeds. Inbound commands (pay, set-balance,
//! set-job, toggle-notifications) and host hooks (join, leave, action events)
//! all come through here; outcomes for players come back on the notification
//! channel returned by [`Economy::open`].

use crate::base::{AccountId, CurrencyId, JobId};
use crate::catalog::{CatalogConfig, CatalogHandle, JobCatalog};
use crate::config::{Backend, Settings};
use crate::currency::CurrencyRegistry;
use crate::dispatcher::{
    ActionEvent, Notification, Notifier, PayoutSummary, RewardDispatcher, notification_channel,
};
use crate::error::EconomyError;
use crate::flat_store::FlatFileStore;
use crate::ledger::{AccountLedger, Receipt, TransferReceipt};
use crate::progression::{JobProgressionTracker, LevelCurve};
use crate::salary::{OnlineRoster, SalaryScheduler, pay_salaries};
use crate::sql_store::SqliteStore;
use crate::store::LedgerStore;
use crossbeam::channel::Receiver;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Snapshot of one account's standing in its active job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub job: JobId,
    pub level: u32,
    pub experience: u64,
    pub experience_to_next_level: u64,
}

/// Top-level economy engine.
pub struct Economy {
    settings: Settings,
    store: Arc<dyn LedgerStore>,
    registry: Arc<CurrencyRegistry>,
    ledger: Arc<AccountLedger>,
    tracker: Arc<JobProgressionTracker>,
    catalog: Arc<CatalogHandle>,
    dispatcher: RewardDispatcher,
    roster: Arc<OnlineRoster>,
    notifier: Notifier,
    scheduler: Mutex<Option<SalaryScheduler>>,
}

impl Economy {
    /// Builds the engine from settings and a job catalog, returning it with
    /// the receiving half of the notification channel.
    pub fn open(
        settings: Settings,
        catalog_config: &CatalogConfig,
    ) -> Result<(Self, Receiver<Notification>), EconomyError> {
        let store: Arc<dyn LedgerStore> = match settings.backend {
            Backend::Flat => match &settings.ledger_path {
                Some(path) => Arc::new(FlatFileStore::open(path)?),
                None => Arc::new(FlatFileStore::in_memory()),
            },
            Backend::Sqlite => match &settings.database_path {
                Some(path) => Arc::new(SqliteStore::open(path)?),
                None => Arc::new(SqliteStore::in_memory()?),
            },
        };

        let registry = Arc::new(CurrencyRegistry::new(settings.currencies.clone())?);
        let ledger = Arc::new(AccountLedger::new(
            store.clone(),
            registry.clone(),
            settings.money_cap,
        ));
        let tracker = Arc::new(JobProgressionTracker::new(store.clone(), settings.level_curve));
        let catalog = Arc::new(CatalogHandle::new(JobCatalog::load(catalog_config)?));
        let (notifier, rx) = notification_channel();
        let dispatcher = RewardDispatcher::new(
            catalog.clone(),
            ledger.clone(),
            tracker.clone(),
            notifier.clone(),
            settings.prevent_job_farming,
        );

        info!(backend = ?settings.backend, currencies = registry.len(), "economy ready");
        let economy = Economy {
            settings,
            store,
            registry,
            ledger,
            tracker,
            catalog,
            dispatcher,
            roster: Arc::new(OnlineRoster::new()),
            notifier,
            scheduler: Mutex::new(None),
        };
        Ok((economy, rx))
    }

    pub fn registry(&self) -> &CurrencyRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &AccountLedger {
        &self.ledger
    }

    pub fn level_curve(&self) -> LevelCurve {
        self.tracker.curve()
    }

    // === Host hooks ===

    /// Registers an account as present: creates the account and its balance
    /// rows (at starting balances) on first sight, then adds it to the
    /// salary roster.
    pub fn join(&self, account: AccountId) -> Result<(), EconomyError> {
        self.store.ensure_account(account)?;
        for currency in self.registry.iter() {
            self.ledger.balance_or_create(account, currency.id)?;
        }
        // Make sure the active job has a progression row so reports show it.
        let job = self.tracker.current_job(account)?;
        if !job.is_unemployed() && self.store.progress(account, &job)?.is_none() {
            self.store.set_progress(account, &job, Default::default())?;
        }
        self.roster.join(account);
        Ok(())
    }

    pub fn leave(&self, account: AccountId) {
        self.roster.leave(account);
    }

    pub fn is_online(&self, account: AccountId) -> bool {
        self.roster.contains(account)
    }

    /// Feeds one in-game action through the reward dispatcher.
    pub fn handle_action(&self, event: &ActionEvent) -> Result<PayoutSummary, EconomyError> {
        self.dispatcher.dispatch(event)
    }

    // === Inbound commands ===

    /// The account's balance in `currency` (default currency when `None`),
    /// creating the balance row at the starting value on first access.
    pub fn balance(
        &self,
        account: AccountId,
        currency: Option<CurrencyId>,
    ) -> Result<Decimal, EconomyError> {
        let currency = currency.unwrap_or(self.registry.default_currency().id);
        self.ledger.balance_or_create(account, currency)
    }

    /// Player-to-player payment. Both sides get a notification on success.
    pub fn pay(
        &self,
        from: AccountId,
        to: AccountId,
        currency: Option<CurrencyId>,
        amount: Decimal,
    ) -> Result<TransferReceipt, EconomyError> {
        let currency = currency.unwrap_or(self.registry.default_currency().id);
        // Sender must exist; the recipient row is created lazily so a first
        // payment to a fresh account works.
        self.ledger.balance_or_create(from, currency)?;
        self.ledger.balance_or_create(to, currency)?;
        let receipt = self.ledger.transfer(from, to, currency, amount)?;
        self.notifier.push(Notification::PaymentSent {
            account: from,
            to,
            currency,
            amount: receipt.amount,
        });
        self.notifier.push(Notification::PaymentReceived {
            account: to,
            from: Some(from),
            currency,
            amount: receipt.amount,
        });
        Ok(receipt)
    }

    /// Admin override of a balance.
    pub fn set_balance(
        &self,
        account: AccountId,
        currency: Option<CurrencyId>,
        amount: Decimal,
    ) -> Result<Receipt, EconomyError> {
        let currency = currency.unwrap_or(self.registry.default_currency().id);
        self.ledger.balance_or_create(account, currency)?;
        self.ledger.set_balance(account, currency, amount)
    }

    /// Switches the account's active job against the current catalog.
    pub fn set_job(&self, account: AccountId, job: &JobId) -> Result<(), EconomyError> {
        let catalog = self.catalog.snapshot();
        self.tracker.set_job(account, job, &catalog)
    }

    /// The account's active job with level, experience, and distance to the
    /// next level.
    pub fn job_status(&self, account: AccountId) -> Result<JobStatus, EconomyError> {
        let job = self.tracker.current_job(account)?;
        let progress = self.tracker.progress(account, &job)?;
        let experience_to_next_level =
            self.tracker.experience_to_next_level(account, &job)?;
        Ok(JobStatus {
            job,
            level: progress.level,
            experience: progress.experience,
            experience_to_next_level,
        })
    }

    /// Flips the account's job-notification flag and returns the new state.
    pub fn toggle_notifications(&self, account: AccountId) -> Result<bool, EconomyError> {
        let enabled = !self.tracker.notifications_enabled(account)?;
        self.tracker.set_notifications_enabled(account, enabled)?;
        Ok(enabled)
    }

    // === Administration ===

    /// Replaces the active job catalog. All-or-nothing: a validation failure
    /// leaves the previous catalog serving.
    pub fn reload_catalog(&self, config: &CatalogConfig) -> Result<(), EconomyError> {
        self.catalog.reload(config)?;
        info!("job catalog reloaded");
        Ok(())
    }

    /// Starts the salary scheduler if enabled in settings. Idempotent.
    pub fn start_salary_task(&self) {
        if !self.settings.salary_enabled {
            return;
        }
        let mut slot = self.scheduler.lock();
        if slot.is_some() {
            return;
        }
        *slot = Some(SalaryScheduler::start(
            Duration::from_secs(self.settings.salary_delay_secs),
            self.roster.clone(),
            self.catalog.clone(),
            self.ledger.clone(),
            self.tracker.clone(),
            self.notifier.clone(),
        ));
    }

    /// Pays one salary round synchronously, outside the scheduler.
    pub fn pay_salaries_now(&self) {
        pay_salaries(&self.roster, &self.catalog, &self.ledger, &self.tracker, &self.notifier);
    }

    /// Stops the salary scheduler, waiting for the thread to exit.
    pub fn shutdown(&self) {
        if let Some(scheduler) = self.scheduler.lock().take() {
            scheduler.stop();
        }
    }

    // === Reporting ===

    /// Every known account with all of its balance rows, for reports.
    pub fn accounts_report(
        &self,
    ) -> Result<Vec<(AccountId, Vec<(CurrencyId, Decimal)>)>, EconomyError> {
        let mut out = Vec::new();
        for account in self.store.accounts()? {
            out.push((account, self.store.balances_of(account)?));
        }
        Ok(out)
    }

    /// Renders an amount in a currency's display format.
    pub fn format(&self, currency: CurrencyId, amount: Decimal) -> Result<String, EconomyError> {
        Ok(self.registry.require(currency)?.format(amount))
    }
}
