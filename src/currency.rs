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

//! Currency definitions and the registry of available currencies.
//!
//! Currencies are immutable catalog data: loaded once from configuration,
//! validated, and shared read-only for the life of the process. Exactly one
//! currency carries the default flag.

use crate::base::CurrencyId;
use crate::error::EconomyError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named unit of value with fixed decimal precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    pub id: CurrencyId,
    pub singular: String,
    pub plural: String,
    pub symbol: String,
    pub fraction_digits: u32,
    #[serde(default)]
    pub is_default: bool,
    /// Balance a fresh account starts with in this currency.
    #[serde(default)]
    pub starting_balance: Decimal,
}

impl Currency {
    /// Scales an amount to this currency's precision, truncating toward zero.
    ///
    /// This is the write-side rule: stored amounts never carry more fraction
    /// digits than the currency defines, and the excess is dropped, not
    /// rounded up.
    pub fn truncate(&self, amount: Decimal) -> Decimal {
        amount.trunc_with_scale(self.fraction_digits)
    }

    /// Renders `symbol + amount` at the currency's precision.
    ///
    /// Display-only: rounds half away from zero and never mutates the stored
    /// amount.
    pub fn format(&self, amount: Decimal) -> String {
        self.format_with_digits(amount, self.fraction_digits)
    }

    /// Renders with an explicit fraction-digit override.
    pub fn format_with_digits(&self, amount: Decimal, digits: u32) -> String {
        let rounded = amount.round_dp_with_strategy(digits, RoundingStrategy::MidpointAwayFromZero);
        format!("{}{:.*}", self.symbol, digits as usize, rounded)
    }
}

/// Registry of all configured currencies.
///
/// Construction fails unless ids are unique and exactly one currency is
/// marked default.
#[derive(Debug)]
pub struct CurrencyRegistry {
    by_id: HashMap<CurrencyId, Currency>,
    default_id: CurrencyId,
}

impl CurrencyRegistry {
    pub fn new(currencies: Vec<Currency>) -> Result<Self, EconomyError> {
        let mut by_id = HashMap::with_capacity(currencies.len());
        let mut default_id = None;

        for currency in currencies {
            if currency.starting_balance < Decimal::ZERO {
                return Err(EconomyError::Configuration(format!(
                    "currency '{}' has a negative starting balance",
                    currency.singular
                )));
            }
            if currency.is_default {
                if default_id.is_some() {
                    return Err(EconomyError::Configuration(
                        "more than one currency is marked default".to_string(),
                    ));
                }
                default_id = Some(currency.id);
            }
            if by_id.insert(currency.id, currency).is_some() {
                return Err(EconomyError::Configuration(
                    "duplicate currency id in configuration".to_string(),
                ));
            }
        }

        let default_id = default_id.ok_or_else(|| {
            EconomyError::Configuration("no currency is marked default".to_string())
        })?;

        Ok(CurrencyRegistry { by_id, default_id })
    }

    /// The single currency marked default in configuration.
    pub fn default_currency(&self) -> &Currency {
        // Presence is guaranteed by the constructor.
        &self.by_id[&self.default_id]
    }

    pub fn get(&self, id: CurrencyId) -> Option<&Currency> {
        self.by_id.get(&id)
    }

    /// Like [`get`](Self::get) but converts absence into a typed error.
    pub fn require(&self, id: CurrencyId) -> Result<&Currency, EconomyError> {
        self.by_id.get(&id).ok_or(EconomyError::UnknownCurrency(id.0))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Currency> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
