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

//! # Coinage
//!
//! A multi-currency economy engine for game servers: exact decimal balances,
//! job-based rewards with per-job progression, periodic salaries, and
//! pluggable persistence.
//!
//! ## Core Components
//!
//! - [`Economy`]: Facade wiring the ledger, catalog, tracker, and scheduler
//! - [`AccountLedger`]: Transactional balance core (deposit, withdraw, transfer)
//! - [`JobCatalog`]: Jobs, job sets, and reward resolution
//! - [`JobProgressionTracker`]: Per-job levels and experience
//! - [`RewardDispatcher`]: Action events in, money and experience out
//! - [`EconomyError`]: Error taxonomy shared by every operation
//!
//! ## Example
//!
//! ```
//! use coinage::{AccountId, CatalogConfig, Economy, JobId, Settings};
//! use coinage::default_catalog_toml;
//! use rust_decimal_macros::dec;
//!
//! let catalog = CatalogConfig::from_toml_str(default_catalog_toml()).unwrap();
//! let (economy, _notifications) = Economy::open(Settings::default(), &catalog).unwrap();
//!
//! let alice = AccountId::random();
//! let bob = AccountId::random();
//! economy.join(alice).unwrap();
//! economy.join(bob).unwrap();
//!
//! economy.pay(alice, bob, None, dec!(25.00)).unwrap();
//! assert_eq!(economy.balance(alice, None).unwrap(), dec!(75.00));
//!
//! economy.set_job(alice, &JobId::new("miner")).unwrap();
//! ```
//!
//! ## Thread Safety
//!
//! Every mutation is serialized per `(account, currency)` or `(account, job)`
//! key, so concurrent deposits, transfers, and reward payouts for different
//! keys proceed in parallel while a single balance never loses an update.

mod base;
mod catalog;
mod config;
mod currency;
mod dispatcher;
mod economy;
pub mod error;
mod flat_store;
mod ledger;
mod progression;
mod salary;
mod sql_store;
mod store;

pub use base::{AccountId, CurrencyId, JobId, UNEMPLOYED};
pub use catalog::{
    ActionKind, ActionReward, CatalogConfig, CatalogHandle, GrowthContext, Job, JobCatalog,
    JobRequirement, JobSet, default_catalog_toml,
};
pub use config::{Backend, Settings};
pub use currency::{Currency, CurrencyRegistry};
pub use dispatcher::{
    ActionEvent, Notification, Notifier, PayoutSummary, RewardDispatcher, notification_channel,
};
pub use economy::{Economy, JobStatus};
pub use error::EconomyError;
pub use flat_store::FlatFileStore;
pub use ledger::{AccountLedger, Receipt, TransactionKind, TransferReceipt};
pub use progression::{ExperienceGain, JobProgressionTracker, LevelCurve};
pub use salary::{OnlineRoster, SalaryScheduler, pay_salaries};
pub use sql_store::SqliteStore;
pub use store::{JobProgress, LedgerStore};
