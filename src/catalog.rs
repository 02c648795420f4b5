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

//! Job catalog: jobs, job sets, and reward resolution.
//!
//! The catalog is read-mostly configuration. A loaded [`JobCatalog`] is
//! immutable; administrative reload builds a complete new catalog and
//! publishes it through [`CatalogHandle`] with an atomic reference swap, so
//! in-flight reward resolution always runs against one consistent snapshot
//! and a failed reload leaves the previous catalog active.

use crate::base::JobId;
use crate::error::EconomyError;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tracing::warn;

/// Kind of in-game action that can earn a reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Break,
    Place,
    Kill,
    Catch,
    Craft,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Break => "break",
            ActionKind::Place => "place",
            ActionKind::Kill => "kill",
            ActionKind::Catch => "catch",
            ActionKind::Craft => "craft",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Growth-trait state carried by a host event (e.g. crop growth stage with
/// its possible value bounds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrowthContext {
    pub value: i64,
    pub min: i64,
    pub max: i64,
}

/// Reward for one `(action, target)` pair inside a job set.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReward {
    pub exp: u32,
    pub money: Decimal,
    /// Currency to pay in; `None` means the registry default.
    pub currency: Option<crate::base::CurrencyId>,
    /// Name of the block trait that scales this reward by growth stage.
    pub growth_trait: Option<String>,
}

impl ActionReward {
    /// Scales the reward linearly between zero and its full value:
    /// `base * (value - min) / (max - min)`, computed in decimal arithmetic.
    /// Experience is floored to a whole number. Equal bounds count as fully
    /// grown.
    pub fn scaled(&self, growth: &GrowthContext) -> ActionReward {
        let span = growth.max - growth.min;
        if span <= 0 {
            return self.clone();
        }
        let fraction =
            Decimal::from(growth.value - growth.min) / Decimal::from(span);
        let fraction = fraction.clamp(Decimal::ZERO, Decimal::ONE);
        let exp = (Decimal::from(self.exp) * fraction)
            .floor()
            .to_u32()
            .unwrap_or(0);
        ActionReward {
            exp,
            money: self.money * fraction,
            currency: self.currency,
            growth_trait: self.growth_trait.clone(),
        }
    }
}

/// Named, reusable bundle of action/target/reward mappings.
#[derive(Debug, Clone)]
pub struct JobSet {
    pub name: String,
    rewards: HashMap<(ActionKind, String), ActionReward>,
}

impl JobSet {
    pub fn reward(&self, action: ActionKind, target: &str) -> Option<&ActionReward> {
        self.rewards.get(&(action, target.to_string()))
    }
}

/// Requirement gating a job switch. The permission string is carried through
/// for the host's permission layer; only the job/level pair is enforced here.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobRequirement {
    pub job: JobId,
    pub level: u32,
    #[serde(default)]
    pub permission: Option<String>,
}

/// A named role granting access to reward mappings and a periodic salary.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub salary: Decimal,
    pub sets: Vec<String>,
    pub requirement: Option<JobRequirement>,
}

impl Job {
    pub fn salary_enabled(&self) -> bool {
        !self.salary.is_zero()
    }
}

// === Configuration schema (TOML) ===

#[derive(Debug, Clone, Deserialize)]
pub struct RewardEntryConfig {
    pub action: ActionKind,
    pub target: String,
    #[serde(default)]
    pub exp: u32,
    #[serde(default)]
    pub money: Decimal,
    #[serde(default)]
    pub currency: Option<crate::base::CurrencyId>,
    #[serde(default)]
    pub growth_trait: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub salary: Decimal,
    #[serde(default)]
    pub sets: Vec<String>,
    #[serde(default)]
    pub require: Option<JobRequirement>,
}

/// On-disk catalog layout: a `jobs` table and a `sets` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub jobs: HashMap<String, JobConfig>,
    #[serde(default)]
    pub sets: HashMap<String, Vec<RewardEntryConfig>>,
}

impl CatalogConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, EconomyError> {
        toml::from_str(raw).map_err(|e| EconomyError::Configuration(e.to_string()))
    }

    pub fn load(path: &std::path::Path) -> Result<Self, EconomyError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}

// === Loaded catalog ===

/// Immutable snapshot of all jobs and job sets.
#[derive(Debug, Clone)]
pub struct JobCatalog {
    jobs: HashMap<JobId, Job>,
    sets: HashMap<String, JobSet>,
}

impl JobCatalog {
    /// Validates and builds a catalog. All-or-nothing: any invalid job,
    /// set entry, or currency reference fails the whole load.
    ///
    /// The `unemployed` fallback job is injected if the configuration does
    /// not define it.
    pub fn load(config: &CatalogConfig) -> Result<Self, EconomyError> {
        let mut sets = HashMap::with_capacity(config.sets.len());
        for (name, entries) in &config.sets {
            if name.trim().is_empty() {
                return Err(EconomyError::Configuration("job set with empty name".to_string()));
            }
            let mut rewards: HashMap<(ActionKind, String), ActionReward> =
                HashMap::with_capacity(entries.len());
            for entry in entries {
                if entry.target.trim().is_empty() {
                    return Err(EconomyError::Configuration(format!(
                        "set '{name}' has a reward with an empty target"
                    )));
                }
                if entry.money < Decimal::ZERO {
                    return Err(EconomyError::Configuration(format!(
                        "set '{name}' target '{}' has a negative money reward",
                        entry.target
                    )));
                }
                let reward = ActionReward {
                    exp: entry.exp,
                    money: entry.money,
                    currency: entry.currency,
                    growth_trait: entry.growth_trait.clone(),
                };
                // Duplicates inside one set resolve the same way duplicates
                // across sets do: the highest experience reward wins.
                match rewards.entry((entry.action, entry.target.clone())) {
                    Entry::Occupied(mut slot) => {
                        warn!(
                            set = %name,
                            action = %entry.action,
                            target = %entry.target,
                            "duplicate reward entry in set, keeping the higher experience one"
                        );
                        if reward.exp > slot.get().exp {
                            slot.insert(reward);
                        }
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(reward);
                    }
                }
            }
            sets.insert(name.clone(), JobSet { name: name.clone(), rewards });
        }

        let mut jobs = HashMap::with_capacity(config.jobs.len() + 1);
        for (name, job_config) in &config.jobs {
            if name.trim().is_empty() {
                return Err(EconomyError::Configuration("job with empty name".to_string()));
            }
            if job_config.salary < Decimal::ZERO {
                return Err(EconomyError::Configuration(format!(
                    "job '{name}' has a negative salary"
                )));
            }
            let id = JobId::new(name);
            jobs.insert(
                id.clone(),
                Job {
                    id,
                    salary: job_config.salary,
                    sets: job_config.sets.clone(),
                    requirement: job_config.require.clone(),
                },
            );
        }

        // The fallback job always exists and pays nothing.
        jobs.entry(JobId::unemployed()).or_insert_with(|| Job {
            id: JobId::unemployed(),
            salary: Decimal::ZERO,
            sets: Vec::new(),
            requirement: None,
        });

        Ok(JobCatalog { jobs, sets })
    }

    /// Looks a job up by name. With `fallback_to_unemployed`, an unknown name
    /// resolves to the fallback job instead of `None`.
    pub fn job(&self, name: &JobId, fallback_to_unemployed: bool) -> Option<&Job> {
        match self.jobs.get(name) {
            Some(job) => Some(job),
            None if fallback_to_unemployed => self.jobs.get(&JobId::unemployed()),
            None => None,
        }
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn set(&self, name: &str) -> Option<&JobSet> {
        self.sets.get(name)
    }

    /// All rewards matching `(action, target)` across the job's referenced
    /// sets. A referenced set missing from the catalog is a warning, not an
    /// error; remaining sets still apply.
    pub fn matching_rewards(
        &self,
        job: &Job,
        action: ActionKind,
        target: &str,
    ) -> Vec<&ActionReward> {
        let mut matches = Vec::new();
        for set_name in &job.sets {
            let Some(set) = self.sets.get(set_name) else {
                warn!(job = %job.id, set = %set_name, "job references unknown set");
                continue;
            };
            if let Some(reward) = set.reward(action, target) {
                matches.push(reward);
            }
        }
        matches
    }

    /// Effective reward for `(action, target)`: of all matches across the
    /// job's sets, the one with the highest experience reward wins, which
    /// resolves duplicates deterministically.
    pub fn resolve_reward(
        &self,
        job: &Job,
        action: ActionKind,
        target: &str,
    ) -> Option<&ActionReward> {
        self.matching_rewards(job, action, target)
            .into_iter()
            .max_by_key(|reward| reward.exp)
    }
}

/// Shared, atomically swappable reference to the current catalog.
pub struct CatalogHandle {
    inner: RwLock<Arc<JobCatalog>>,
}

impl CatalogHandle {
    pub fn new(catalog: JobCatalog) -> Self {
        CatalogHandle { inner: RwLock::new(Arc::new(catalog)) }
    }

    /// The current snapshot. Holders keep reading a consistent catalog even
    /// if a reload swaps the reference underneath them.
    pub fn snapshot(&self) -> Arc<JobCatalog> {
        self.inner.read().clone()
    }

    /// Re-parses and validates the configuration, swapping the active
    /// catalog only if the entire load succeeds.
    pub fn reload(&self, config: &CatalogConfig) -> Result<(), EconomyError> {
        let fresh = JobCatalog::load(config)?;
        *self.inner.write() = Arc::new(fresh);
        Ok(())
    }
}

/// Catalog shipped as a starting point: mirrors the classic default jobs.
pub fn default_catalog_toml() -> &'static str {
    r#"
[jobs.unemployed]
salary = "0"

[jobs.miner]
salary = "10.00"
sets = ["ore-set"]

[jobs.lumberjack]
salary = "10.00"
sets = ["tree-set"]

[jobs.fisherman]
salary = "10.00"
sets = ["fish-set"]

[jobs.warrior]
salary = "10.00"
sets = ["combat-set"]

[jobs.farmer]
salary = "10.00"
sets = ["crop-set"]

[[sets.ore-set]]
action = "break"
target = "coal_ore"
exp = 1
money = "0.50"

[[sets.ore-set]]
action = "break"
target = "iron_ore"
exp = 2
money = "1.00"

[[sets.ore-set]]
action = "break"
target = "diamond_ore"
exp = 10
money = "5.00"

[[sets.tree-set]]
action = "break"
target = "oak_log"
exp = 1
money = "0.25"

[[sets.tree-set]]
action = "place"
target = "oak_sapling"
exp = 1
money = "0.10"

[[sets.fish-set]]
action = "catch"
target = "cod"
exp = 2
money = "1.00"

[[sets.combat-set]]
action = "kill"
target = "zombie"
exp = 2
money = "1.00"

[[sets.combat-set]]
action = "kill"
target = "skeleton"
exp = 3
money = "1.50"

[[sets.crop-set]]
action = "break"
target = "wheat"
exp = 1
money = "0.40"
growth_trait = "age"

[[sets.crop-set]]
action = "craft"
target = "bread"
exp = 1
money = "0.25"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn catalog() -> JobCatalog {
        let config = CatalogConfig::from_toml_str(default_catalog_toml()).unwrap();
        JobCatalog::load(&config).unwrap()
    }

    #[test]
    fn default_catalog_loads() {
        let catalog = catalog();
        assert!(catalog.job(&JobId::new("miner"), false).is_some());
        assert!(catalog.job(&JobId::new("unemployed"), false).is_some());
    }

    #[test]
    fn unknown_job_falls_back_to_unemployed_when_asked() {
        let catalog = catalog();
        assert!(catalog.job(&JobId::new("astronaut"), false).is_none());
        let job = catalog.job(&JobId::new("astronaut"), true).unwrap();
        assert!(job.id.is_unemployed());
    }

    #[test]
    fn unemployed_is_injected_when_absent() {
        let config = CatalogConfig::from_toml_str(
            r#"
            [jobs.miner]
            salary = "10.00"
            "#,
        )
        .unwrap();
        let catalog = JobCatalog::load(&config).unwrap();
        let job = catalog.job(&JobId::unemployed(), false).unwrap();
        assert!(!job.salary_enabled());
    }

    #[test]
    fn resolve_reward_picks_highest_exp_across_sets() {
        let config = CatalogConfig::from_toml_str(
            r#"
            [jobs.miner]
            salary = "10.00"
            sets = ["a", "b"]

            [[sets.a]]
            action = "break"
            target = "coal_ore"
            exp = 1
            money = "0.50"

            [[sets.b]]
            action = "break"
            target = "coal_ore"
            exp = 3
            money = "0.10"
            "#,
        )
        .unwrap();
        let catalog = JobCatalog::load(&config).unwrap();
        let job = catalog.job(&JobId::new("miner"), false).unwrap();

        let reward = catalog.resolve_reward(job, ActionKind::Break, "coal_ore").unwrap();
        assert_eq!(reward.exp, 3);
        assert_eq!(reward.money, dec!(0.10));
    }

    #[test]
    fn duplicate_entries_within_a_set_keep_the_highest_exp() {
        let config = CatalogConfig::from_toml_str(
            r#"
            [jobs.miner]
            salary = "10.00"
            sets = ["ores"]

            [[sets.ores]]
            action = "break"
            target = "coal_ore"
            exp = 5
            money = "0.10"

            [[sets.ores]]
            action = "break"
            target = "coal_ore"
            exp = 1
            money = "0.50"
            "#,
        )
        .unwrap();
        let catalog = JobCatalog::load(&config).unwrap();
        let job = catalog.job(&JobId::new("miner"), false).unwrap();

        // The same rule as across sets: the higher-exp entry wins, whatever
        // order the file lists them in.
        let reward = catalog.resolve_reward(job, ActionKind::Break, "coal_ore").unwrap();
        assert_eq!(reward.exp, 5);
        assert_eq!(reward.money, dec!(0.10));
    }

    #[test]
    fn dangling_set_reference_is_nonfatal() {
        let config = CatalogConfig::from_toml_str(
            r#"
            [jobs.miner]
            salary = "10.00"
            sets = ["missing", "ores"]

            [[sets.ores]]
            action = "break"
            target = "coal_ore"
            exp = 1
            money = "0.50"
            "#,
        )
        .unwrap();
        let catalog = JobCatalog::load(&config).unwrap();
        let job = catalog.job(&JobId::new("miner"), false).unwrap();
        let reward = catalog.resolve_reward(job, ActionKind::Break, "coal_ore");
        assert!(reward.is_some());
    }

    #[test]
    fn invalid_catalog_is_rejected_whole() {
        let config = CatalogConfig::from_toml_str(
            r#"
            [jobs.miner]
            salary = "-5.00"
            "#,
        )
        .unwrap();
        assert!(matches!(
            JobCatalog::load(&config).unwrap_err(),
            EconomyError::Configuration(_)
        ));
    }

    #[test]
    fn failed_reload_keeps_previous_catalog() {
        let handle = CatalogHandle::new(catalog());
        let bad = CatalogConfig::from_toml_str(
            r#"
            [jobs.miner]
            salary = "-1"
            "#,
        )
        .unwrap();
        assert!(handle.reload(&bad).is_err());
        // Previous snapshot still answers.
        let snapshot = handle.snapshot();
        assert!(snapshot.job(&JobId::new("miner"), false).is_some());
    }

    #[test]
    fn reload_swaps_snapshot_but_old_readers_finish() {
        let handle = CatalogHandle::new(catalog());
        let old = handle.snapshot();

        let fresh = CatalogConfig::from_toml_str(
            r#"
            [jobs.smith]
            salary = "2.00"
            "#,
        )
        .unwrap();
        handle.reload(&fresh).unwrap();

        // Old snapshot unchanged, new snapshot reflects the reload.
        assert!(old.job(&JobId::new("miner"), false).is_some());
        let new = handle.snapshot();
        assert!(new.job(&JobId::new("miner"), false).is_none());
        assert!(new.job(&JobId::new("smith"), false).is_some());
    }

    #[test]
    fn growth_scaling_is_linear_in_decimal() {
        let reward = ActionReward {
            exp: 10,
            money: dec!(1.00),
            currency: None,
            growth_trait: Some("age".to_string()),
        };

        let half = reward.scaled(&GrowthContext { value: 4, min: 0, max: 8 });
        assert_eq!(half.exp, 5);
        assert_eq!(half.money, dec!(0.50));

        let none = reward.scaled(&GrowthContext { value: 0, min: 0, max: 8 });
        assert_eq!(none.exp, 0);
        assert_eq!(none.money, Decimal::ZERO);

        // Equal bounds count as fully grown.
        let flat = reward.scaled(&GrowthContext { value: 3, min: 3, max: 3 });
        assert_eq!(flat.exp, 10);
        assert_eq!(flat.money, dec!(1.00));
    }
}
