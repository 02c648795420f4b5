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

//! Per-job level and experience tracking.
//!
//! Progression is kept per `(account, job)` so switching jobs never erases
//! earned levels; coming back to a job resumes where the account left off.
//! Mutations are serialized per key the same way the ledger serializes
//! balance writes.

use crate::base::{AccountId, JobId};
use crate::catalog::JobCatalog;
use crate::error::EconomyError;
use crate::store::{JobProgress, LedgerStore};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Experience threshold shape for advancing out of a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LevelCurve {
    /// `level * 100` experience to leave `level`.
    #[default]
    Linear,
    /// `50 * level * (level + 1)`: each level costs progressively more.
    Quadratic,
}

impl LevelCurve {
    /// Experience required to advance from `level` to `level + 1`.
    pub fn exp_to_level(&self, level: u32) -> u64 {
        let level = u64::from(level);
        match self {
            LevelCurve::Linear => level * 100,
            LevelCurve::Quadratic => 50 * level * (level + 1),
        }
    }
}

/// Result of crediting experience to an account's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperienceGain {
    pub job: JobId,
    pub gained: u64,
    pub level: u32,
    pub experience: u64,
    /// Levels crossed by this credit; empty when the account did not level up.
    pub levels_reached: Vec<u32>,
}

impl ExperienceGain {
    pub fn leveled_up(&self) -> bool {
        !self.levels_reached.is_empty()
    }
}

type Key = (AccountId, JobId);

/// Tracks job membership and per-job progression over the shared store.
pub struct JobProgressionTracker {
    store: Arc<dyn LedgerStore>,
    curve: LevelCurve,
    locks: DashMap<Key, Arc<Mutex<()>>>,
}

impl JobProgressionTracker {
    pub fn new(store: Arc<dyn LedgerStore>, curve: LevelCurve) -> Self {
        JobProgressionTracker { store, curve, locks: DashMap::new() }
    }

    pub fn curve(&self) -> LevelCurve {
        self.curve
    }

    fn key_lock(&self, account: AccountId, job: &JobId) -> Arc<Mutex<()>> {
        self.locks.entry((account, job.clone())).or_default().clone()
    }

    /// The account's active job. Accounts with no assignment are unemployed.
    pub fn current_job(&self, account: AccountId) -> Result<JobId, EconomyError> {
        Ok(self.store.job_of(account)?.unwrap_or_else(JobId::unemployed))
    }

    /// Progression row for `(account, job)`; level 1 with zero experience
    /// when no row exists yet.
    pub fn progress(&self, account: AccountId, job: &JobId) -> Result<JobProgress, EconomyError> {
        Ok(self.store.progress(account, job)?.unwrap_or_default())
    }

    pub fn level(&self, account: AccountId, job: &JobId) -> Result<u32, EconomyError> {
        Ok(self.progress(account, job)?.level)
    }

    pub fn experience(&self, account: AccountId, job: &JobId) -> Result<u64, EconomyError> {
        Ok(self.progress(account, job)?.experience)
    }

    /// Experience still needed before the account's next level in `job`.
    pub fn experience_to_next_level(
        &self,
        account: AccountId,
        job: &JobId,
    ) -> Result<u64, EconomyError> {
        let progress = self.progress(account, job)?;
        Ok(self
            .curve
            .exp_to_level(progress.level)
            .saturating_sub(progress.experience))
    }

    /// Whether the account wants job payout notifications.
    pub fn notifications_enabled(&self, account: AccountId) -> Result<bool, EconomyError> {
        self.store.notifications_enabled(account)
    }

    pub fn set_notifications_enabled(
        &self,
        account: AccountId,
        enabled: bool,
    ) -> Result<(), EconomyError> {
        self.store.set_notifications_enabled(account, enabled)
    }

    /// Switches the account to `job`, enforcing the job's requirement against
    /// stored progression. Existing rows are never reset; a progression row
    /// is created on first assignment so the job shows up in reports.
    pub fn set_job(
        &self,
        account: AccountId,
        job: &JobId,
        catalog: &JobCatalog,
    ) -> Result<(), EconomyError> {
        let Some(entry) = catalog.job(job, false) else {
            return Err(EconomyError::UnknownJob(job.as_str().to_string()));
        };
        if let Some(requirement) = &entry.requirement {
            let held = self.level(account, &requirement.job)?;
            if held < requirement.level {
                return Err(EconomyError::RequirementNotMet {
                    job: requirement.job.as_str().to_string(),
                    level: requirement.level,
                });
            }
        }

        let lock = self.key_lock(account, job);
        let _guard = lock.lock();
        self.store.ensure_account(account)?;
        self.store.set_job_of(account, job)?;
        if self.store.progress(account, job)?.is_none() {
            self.store.set_progress(account, job, JobProgress::default())?;
        }
        Ok(())
    }

    /// Credits experience to `(account, job)`, applying level-ups with
    /// carry-over: surplus experience past a threshold counts toward the next
    /// level, across as many levels as the credit spans.
    ///
    /// The unemployed job never accrues experience; crediting it is a no-op
    /// that reports zero gain.
    pub fn add_experience(
        &self,
        account: AccountId,
        job: &JobId,
        amount: u64,
    ) -> Result<ExperienceGain, EconomyError> {
        if job.is_unemployed() || amount == 0 {
            let progress = self.progress(account, job)?;
            return Ok(ExperienceGain {
                job: job.clone(),
                gained: 0,
                level: progress.level,
                experience: progress.experience,
                levels_reached: Vec::new(),
            });
        }

        let lock = self.key_lock(account, job);
        let _guard = lock.lock();
        let mut progress = self.store.progress(account, job)?.unwrap_or_default();
        progress.experience += amount;

        let mut levels_reached = Vec::new();
        loop {
            let threshold = self.curve.exp_to_level(progress.level);
            if progress.experience < threshold {
                break;
            }
            progress.experience -= threshold;
            progress.level += 1;
            levels_reached.push(progress.level);
        }

        self.store.set_progress(account, job, progress)?;
        if !levels_reached.is_empty() {
            debug!(%account, %job, level = progress.level, "level up");
        }
        Ok(ExperienceGain {
            job: job.clone(),
            gained: amount,
            level: progress.level,
            experience: progress.experience,
            levels_reached,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogConfig, JobCatalog};
    use crate::flat_store::FlatFileStore;

    fn catalog() -> JobCatalog {
        let config = CatalogConfig::from_toml_str(
            r#"
            [jobs.miner]
            salary = "10.00"

            [jobs.foreman]
            salary = "20.00"
            require = { job = "miner", level = 10 }
            "#,
        )
        .unwrap();
        JobCatalog::load(&config).unwrap()
    }

    fn tracker(curve: LevelCurve) -> JobProgressionTracker {
        JobProgressionTracker::new(Arc::new(FlatFileStore::in_memory()), curve)
    }

    #[test]
    fn linear_and_quadratic_thresholds() {
        assert_eq!(LevelCurve::Linear.exp_to_level(1), 100);
        assert_eq!(LevelCurve::Linear.exp_to_level(5), 500);
        assert_eq!(LevelCurve::Quadratic.exp_to_level(1), 100);
        assert_eq!(LevelCurve::Quadratic.exp_to_level(2), 300);
        assert_eq!(LevelCurve::Quadratic.exp_to_level(5), 1500);
    }

    #[test]
    fn fresh_account_is_unemployed_at_level_one() {
        let tracker = tracker(LevelCurve::Linear);
        let account = AccountId::random();
        assert!(tracker.current_job(account).unwrap().is_unemployed());
        assert_eq!(tracker.level(account, &JobId::new("miner")).unwrap(), 1);
        assert_eq!(tracker.experience(account, &JobId::new("miner")).unwrap(), 0);
    }

    #[test]
    fn level_up_carries_surplus_experience_over() {
        let tracker = tracker(LevelCurve::Linear);
        let account = AccountId::random();
        let miner = JobId::new("miner");

        tracker.add_experience(account, &miner, 95).unwrap();
        let gain = tracker.add_experience(account, &miner, 10).unwrap();
        assert_eq!(gain.level, 2);
        assert_eq!(gain.experience, 5);
        assert_eq!(gain.levels_reached, vec![2]);
    }

    #[test]
    fn one_credit_can_span_multiple_levels() {
        let tracker = tracker(LevelCurve::Linear);
        let account = AccountId::random();
        let miner = JobId::new("miner");

        // 100 + 200 = 300 to reach level 3; 350 leaves 50 surplus.
        let gain = tracker.add_experience(account, &miner, 350).unwrap();
        assert_eq!(gain.level, 3);
        assert_eq!(gain.experience, 50);
        assert_eq!(gain.levels_reached, vec![2, 3]);
    }

    #[test]
    fn unemployed_never_accrues_experience() {
        let tracker = tracker(LevelCurve::Linear);
        let account = AccountId::random();

        let gain = tracker
            .add_experience(account, &JobId::unemployed(), 1000)
            .unwrap();
        assert_eq!(gain.gained, 0);
        assert_eq!(gain.level, 1);
        assert_eq!(gain.experience, 0);
        assert!(!gain.leveled_up());
    }

    #[test]
    fn set_job_enforces_requirement() {
        let tracker = tracker(LevelCurve::Linear);
        let catalog = catalog();
        let account = AccountId::random();

        let err = tracker
            .set_job(account, &JobId::new("foreman"), &catalog)
            .unwrap_err();
        assert_eq!(
            err,
            EconomyError::RequirementNotMet { job: "miner".to_string(), level: 10 }
        );

        // Grind miner to level 10 (linear: 100+200+...+900 = 4500).
        tracker.set_job(account, &JobId::new("miner"), &catalog).unwrap();
        tracker.add_experience(account, &JobId::new("miner"), 4500).unwrap();
        tracker.set_job(account, &JobId::new("foreman"), &catalog).unwrap();
        assert_eq!(tracker.current_job(account).unwrap(), JobId::new("foreman"));
    }

    #[test]
    fn switching_jobs_preserves_progression() {
        let tracker = tracker(LevelCurve::Linear);
        let catalog = catalog();
        let account = AccountId::random();
        let miner = JobId::new("miner");

        tracker.set_job(account, &miner, &catalog).unwrap();
        tracker.add_experience(account, &miner, 150).unwrap();

        tracker.set_job(account, &JobId::unemployed(), &catalog).unwrap();
        tracker.set_job(account, &miner, &catalog).unwrap();

        let progress = tracker.progress(account, &miner).unwrap();
        assert_eq!(progress.level, 2);
        assert_eq!(progress.experience, 50);
    }

    #[test]
    fn unknown_job_is_rejected() {
        let tracker = tracker(LevelCurve::Linear);
        let catalog = catalog();
        let account = AccountId::random();
        assert_eq!(
            tracker
                .set_job(account, &JobId::new("astronaut"), &catalog)
                .unwrap_err(),
            EconomyError::UnknownJob("astronaut".to_string())
        );
    }
}
