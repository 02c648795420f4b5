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

//! Runtime settings loaded from a TOML file.
//!
//! The recognized surface mirrors what a server operator tunes: currencies,
//! money cap, salary timing, anti-farming, and the persistence backend.

use crate::base::CurrencyId;
use crate::currency::Currency;
use crate::error::EconomyError;
use crate::progression::LevelCurve;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::PathBuf;

/// Which persistence backend the ledger store uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Flat hierarchical tree, rewritten to disk on every mutation.
    #[default]
    Flat,
    /// Embedded relational database with row-level statements.
    Sqlite,
}

/// Operator-facing configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Maximum balance any single currency balance may hold. `None` disables
    /// the cap.
    pub money_cap: Option<Decimal>,
    pub salary_enabled: bool,
    /// Interval between salary payouts, in seconds.
    pub salary_delay_secs: u64,
    /// Decline break rewards for blocks placed by a player, unless the block
    /// declares a growth trait.
    pub prevent_job_farming: bool,
    pub backend: Backend,
    /// Flat-store file location. `None` keeps the tree in memory only.
    pub ledger_path: Option<PathBuf>,
    /// SQLite database location. `None` uses an in-memory database.
    pub database_path: Option<PathBuf>,
    pub level_curve: LevelCurve,
    pub currencies: Vec<Currency>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            money_cap: None,
            salary_enabled: true,
            salary_delay_secs: 300,
            prevent_job_farming: true,
            backend: Backend::Flat,
            ledger_path: None,
            database_path: None,
            level_curve: LevelCurve::Linear,
            currencies: vec![Currency {
                id: CurrencyId(1),
                singular: "Dollar".to_string(),
                plural: "Dollars".to_string(),
                symbol: "$".to_string(),
                fraction_digits: 2,
                is_default: true,
                starting_balance: dec!(100.00),
            }],
        }
    }
}

impl Settings {
    pub fn from_toml_str(raw: &str) -> Result<Self, EconomyError> {
        toml::from_str(raw).map_err(|e| EconomyError::Configuration(e.to_string()))
    }

    pub fn load(path: &std::path::Path) -> Result<Self, EconomyError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}
