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

//! Lending policy configuration.
//!
//! Policy values are layered: built-in defaults, then an optional file, then
//! `LENDING_*` environment variables (for example `LENDING_LOAN_PERIOD_DAYS=21`).

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "LENDING";

/// Tunable rules for loan periods, fines, and borrowing eligibility.
///
/// Monetary amounts are integer currency units.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LendingPolicy {
    /// Days between borrow date and due date.
    pub loan_period_days: i64,
    /// Fine charged per whole day late.
    pub per_day_fine_rate: u64,
    /// Replacement charge per lost book.
    pub lost_book_surcharge: u64,
    /// Charge per book returned damaged.
    pub damaged_book_surcharge: u64,
    /// Outstanding fines above this amount block new checkouts.
    pub eligibility_fine_ceiling: u64,
    /// Days a loan may be overdue before the member is blocked.
    pub overdue_grace_days: i64,
    /// Maximum copies a member may hold at once.
    pub max_books_on_loan: u32,
    /// Maximum renewals per transaction.
    pub max_renewals: u32,
    /// Whether a book returned damaged goes back on the shelf.
    pub damaged_returns_to_stock: bool,
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self {
            loan_period_days: 14,
            per_day_fine_rate: 1000,
            lost_book_surcharge: 50_000,
            damaged_book_surcharge: 0,
            eligibility_fine_ceiling: 10_000,
            overdue_grace_days: 0,
            max_books_on_loan: 10,
            max_renewals: 2,
            damaged_returns_to_stock: true,
        }
    }
}

impl LendingPolicy {
    /// Loads the policy from an optional file plus environment overrides.
    ///
    /// The file format is inferred from its extension.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        Self::build(builder)
    }

    /// Parses a TOML document, then applies environment overrides.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Self::build(Config::builder().add_source(File::from_str(contents, FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let policy: Self = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        policy.validate()?;
        Ok(policy)
    }

    /// Rejects values that would make due dates or eligibility meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.loan_period_days <= 0 {
            return Err(ConfigError::Message(format!(
                "loan_period_days must be positive, got {}",
                self.loan_period_days
            )));
        }
        if self.overdue_grace_days < 0 {
            return Err(ConfigError::Message(format!(
                "overdue_grace_days must not be negative, got {}",
                self.overdue_grace_days
            )));
        }
        Ok(())
    }
}
