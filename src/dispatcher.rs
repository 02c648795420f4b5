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

//! Turns in-game action events into money and experience payouts.
//!
//! The dispatcher is the glue between the job catalog, the account ledger,
//! and the progression tracker. It also owns the notification side channel:
//! every user-visible outcome is pushed onto an unbounded queue the host
//! drains and renders however it likes (chat messages, action bar, logs).

use crate::base::{AccountId, CurrencyId};
use crate::catalog::{ActionKind, ActionReward, CatalogHandle, GrowthContext};
use crate::error::EconomyError;
use crate::ledger::AccountLedger;
use crate::progression::{ExperienceGain, JobProgressionTracker};
use crossbeam::channel::{Receiver, Sender, unbounded};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

/// One observed in-game action, as reported by the host.
#[derive(Debug, Clone)]
pub struct ActionEvent {
    pub actor: AccountId,
    pub action: ActionKind,
    /// Identifier of the thing acted on (block, entity, fish, item).
    pub target: String,
    /// Growth-trait state of the target block, when the host knows it.
    pub growth: Option<GrowthContext>,
    /// Account that placed the target block, when the host tracked it.
    pub placer: Option<AccountId>,
}

impl ActionEvent {
    pub fn new(actor: AccountId, action: ActionKind, target: impl Into<String>) -> Self {
        ActionEvent { actor, action, target: target.into(), growth: None, placer: None }
    }

    pub fn with_growth(mut self, growth: GrowthContext) -> Self {
        self.growth = Some(growth);
        self
    }

    pub fn with_placer(mut self, placer: AccountId) -> Self {
        self.placer = Some(placer);
        self
    }
}

/// User-visible outcome, for the host to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    PaymentSent {
        account: AccountId,
        to: AccountId,
        currency: CurrencyId,
        amount: Decimal,
    },
    PaymentReceived {
        account: AccountId,
        /// `None` for system payouts (rewards, salaries).
        from: Option<AccountId>,
        currency: CurrencyId,
        amount: Decimal,
    },
    ExpGained {
        account: AccountId,
        job: String,
        amount: u64,
    },
    LevelUp {
        account: AccountId,
        job: String,
        level: u32,
    },
    SalaryPaid {
        account: AccountId,
        currency: CurrencyId,
        amount: Decimal,
    },
    Error {
        account: AccountId,
        message: String,
    },
}

impl Notification {
    /// The account this notification should be delivered to.
    pub fn account(&self) -> AccountId {
        match self {
            Notification::PaymentSent { account, .. }
            | Notification::PaymentReceived { account, .. }
            | Notification::ExpGained { account, .. }
            | Notification::LevelUp { account, .. }
            | Notification::SalaryPaid { account, .. }
            | Notification::Error { account, .. } => *account,
        }
    }
}

/// Sending half of the notification queue. Cheap to clone; a closed receiver
/// only drops notifications, it never fails an operation.
#[derive(Clone)]
pub struct Notifier {
    tx: Sender<Notification>,
}

impl Notifier {
    pub fn push(&self, notification: Notification) {
        let _ = self.tx.send(notification);
    }
}

/// Creates the notification queue the host drains.
pub fn notification_channel() -> (Notifier, Receiver<Notification>) {
    let (tx, rx) = unbounded();
    (Notifier { tx }, rx)
}

/// What one action event paid out.
#[derive(Debug, Clone, Default)]
pub struct PayoutSummary {
    /// Money credited, after growth scaling. `None` when nothing was paid
    /// (no matching reward, declined, or zero money).
    pub money: Option<(CurrencyId, Decimal)>,
    /// Experience credited, with any level-ups crossed.
    pub experience: Option<ExperienceGain>,
}

impl PayoutSummary {
    pub fn is_empty(&self) -> bool {
        self.money.is_none() && self.experience.is_none()
    }
}

/// Resolves action events against the active catalog and pays rewards.
pub struct RewardDispatcher {
    catalog: Arc<CatalogHandle>,
    ledger: Arc<AccountLedger>,
    tracker: Arc<JobProgressionTracker>,
    notifier: Notifier,
    prevent_farming: bool,
}

impl RewardDispatcher {
    pub fn new(
        catalog: Arc<CatalogHandle>,
        ledger: Arc<AccountLedger>,
        tracker: Arc<JobProgressionTracker>,
        notifier: Notifier,
        prevent_farming: bool,
    ) -> Self {
        RewardDispatcher { catalog, ledger, tracker, notifier, prevent_farming }
    }

    /// Handles one action event end to end: resolve the actor's job, pick the
    /// effective reward, scale it by growth, credit money and experience, and
    /// queue notifications for accounts that want them.
    ///
    /// Events that match no reward are a quiet no-op; the host reports every
    /// block break and most earn nothing.
    pub fn dispatch(&self, event: &ActionEvent) -> Result<PayoutSummary, EconomyError> {
        let catalog = self.catalog.snapshot();
        let job_id = self.tracker.current_job(event.actor)?;
        let Some(job) = catalog.job(&job_id, true) else {
            return Ok(PayoutSummary::default());
        };

        let mut candidates = catalog.matching_rewards(job, event.action, &event.target);
        // Breaking a block someone placed is farmable: only rewards tied to a
        // growth trait survive, since growth resets on harvest. Other action
        // kinds are unaffected by who placed the target.
        if self.prevent_farming && event.action == ActionKind::Break && event.placer.is_some() {
            candidates.retain(|reward| reward.growth_trait.is_some());
        }
        let Some(reward) = candidates.into_iter().max_by_key(|reward| reward.exp) else {
            return Ok(PayoutSummary::default());
        };

        let reward = match self.apply_growth(reward, event) {
            Some(reward) => reward,
            None => return Ok(PayoutSummary::default()),
        };

        let currency = reward
            .currency
            .unwrap_or_else(|| self.ledger.registry().default_currency().id);
        let notify = self.tracker.notifications_enabled(event.actor)?;
        let mut summary = PayoutSummary::default();

        if reward.money > Decimal::ZERO {
            self.ledger.balance_or_create(event.actor, currency)?;
            match self.ledger.deposit(event.actor, currency, reward.money) {
                Ok(receipt) => {
                    summary.money = Some((currency, receipt.amount));
                    if notify {
                        self.notifier.push(Notification::PaymentReceived {
                            account: event.actor,
                            from: None,
                            currency,
                            amount: receipt.amount,
                        });
                    }
                }
                // A capped account simply stops earning; the action itself
                // must not fail.
                Err(EconomyError::AccountNoSpace) => {
                    debug!(actor = %event.actor, %currency, "reward declined, balance at cap");
                }
                Err(err) => return Err(err),
            }
        }

        if reward.exp > 0 {
            let gain = self
                .tracker
                .add_experience(event.actor, &job.id, u64::from(reward.exp))?;
            if gain.gained > 0 {
                if notify {
                    self.notifier.push(Notification::ExpGained {
                        account: event.actor,
                        job: job.id.as_str().to_string(),
                        amount: gain.gained,
                    });
                    for level in &gain.levels_reached {
                        self.notifier.push(Notification::LevelUp {
                            account: event.actor,
                            job: job.id.as_str().to_string(),
                            level: *level,
                        });
                    }
                }
                summary.experience = Some(gain);
            }
        }

        Ok(summary)
    }

    /// Scales a growth-trait reward by the event's growth state. A reward
    /// that declares a trait the event does not carry is declined; paying
    /// full price for an unreadable growth stage would reward farming
    /// half-grown crops.
    fn apply_growth(&self, reward: &ActionReward, event: &ActionEvent) -> Option<ActionReward> {
        match (&reward.growth_trait, &event.growth) {
            (Some(_), Some(growth)) => Some(reward.scaled(growth)),
            (Some(trait_name), None) => {
                warn!(
                    actor = %event.actor,
                    target = %event.target,
                    growth_trait = %trait_name,
                    "reward declares growth trait but event carries no growth state"
                );
                None
            }
            (None, _) => Some(reward.clone()),
        }
    }
}
