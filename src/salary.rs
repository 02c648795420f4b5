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

//! Periodic salary payouts.
//!
//! A background thread ticks at the configured interval and pays every online
//! account its job's salary in the default currency. One account's failure
//! never blocks the rest of the roster; the account gets an error
//! notification and the run moves on. There is no mid-interval retry, the
//! next tick simply pays again.

use crate::base::AccountId;
use crate::catalog::CatalogHandle;
use crate::dispatcher::{Notification, Notifier};
use crate::ledger::AccountLedger;
use crate::progression::JobProgressionTracker;
use crossbeam::channel::{Sender, bounded, select, tick};
use dashmap::DashSet;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Accounts currently online, maintained by the host's join/leave hooks.
/// Salaries are only paid to present accounts.
#[derive(Debug, Default)]
pub struct OnlineRoster {
    online: DashSet<AccountId>,
}

impl OnlineRoster {
    pub fn new() -> Self {
        OnlineRoster::default()
    }

    pub fn join(&self, account: AccountId) {
        self.online.insert(account);
    }

    pub fn leave(&self, account: AccountId) {
        self.online.remove(&account);
    }

    pub fn contains(&self, account: AccountId) -> bool {
        self.online.contains(&account)
    }

    pub fn snapshot(&self) -> Vec<AccountId> {
        self.online.iter().map(|entry| *entry).collect()
    }

    pub fn len(&self) -> usize {
        self.online.len()
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }
}

/// Pays one salary round to every online account. Exposed separately from
/// the scheduler thread so a payout round is directly testable.
pub fn pay_salaries(
    roster: &OnlineRoster,
    catalog: &CatalogHandle,
    ledger: &AccountLedger,
    tracker: &JobProgressionTracker,
    notifier: &Notifier,
) {
    let catalog = catalog.snapshot();
    let currency = ledger.registry().default_currency().id;

    for account in roster.snapshot() {
        let job_id = match tracker.current_job(account) {
            Ok(job_id) => job_id,
            Err(err) => {
                warn!(%account, %err, "salary skipped, job lookup failed");
                notifier.push(Notification::Error {
                    account,
                    message: format!("salary could not be paid: {err}"),
                });
                continue;
            }
        };
        let Some(job) = catalog.job(&job_id, false) else {
            // Job was removed from the catalog while still assigned.
            warn!(%account, job = %job_id, "salary skipped, job not in catalog");
            notifier.push(Notification::Error {
                account,
                message: format!("salary could not be paid: job '{job_id}' no longer exists"),
            });
            continue;
        };
        if !job.salary_enabled() {
            continue;
        }

        let paid = ledger
            .balance_or_create(account, currency)
            .and_then(|_| ledger.deposit(account, currency, job.salary));
        match paid {
            Ok(receipt) => {
                debug!(%account, job = %job.id, amount = %receipt.amount, "salary paid");
                notifier.push(Notification::SalaryPaid {
                    account,
                    currency,
                    amount: receipt.amount,
                });
            }
            Err(err) => {
                warn!(%account, job = %job.id, %err, "salary payment failed");
                notifier.push(Notification::Error {
                    account,
                    message: format!("salary could not be paid: {err}"),
                });
            }
        }
    }
}

/// Background thread paying salaries on a fixed interval.
pub struct SalaryScheduler {
    shutdown: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl SalaryScheduler {
    /// Spawns the scheduler. The first payout happens one full interval
    /// after start, not immediately.
    pub fn start(
        interval: Duration,
        roster: Arc<OnlineRoster>,
        catalog: Arc<CatalogHandle>,
        ledger: Arc<AccountLedger>,
        tracker: Arc<JobProgressionTracker>,
        notifier: Notifier,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let handle = std::thread::Builder::new()
            .name("salary-scheduler".to_string())
            .spawn(move || {
                let ticker = tick(interval);
                info!(interval_secs = interval.as_secs(), "salary scheduler running");
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            pay_salaries(&roster, &catalog, &ledger, &tracker, &notifier);
                        }
                        recv(shutdown_rx) -> _ => {
                            info!("salary scheduler stopping");
                            return;
                        }
                    }
                }
            })
            .ok();
        SalaryScheduler { shutdown: shutdown_tx, handle }
    }

    /// Signals the thread to exit and waits for it.
    pub fn stop(mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SalaryScheduler {
    fn drop(&mut self) {
        // Dropping the sender closes the channel, which also wakes the loop.
        if let Some(handle) = self.handle.take() {
            let _ = self.shutdown.send(());
            let _ = handle.join();
        }
    }
}
