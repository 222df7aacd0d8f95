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

//! Fine assessment.
//!
//! Pure functions of dates, conditions, and [`LendingPolicy`]; nothing here
//! touches storage.

use crate::config::LendingPolicy;
use crate::transaction::BookCondition;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Breakdown of a fine computed at return time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FineAssessment {
    pub days_late: i64,
    pub late_fee: u64,
    pub loss_fee: u64,
    pub damage_fee: u64,
    pub total: u64,
}

/// Whole days between `due_date` and `return_date`, zero when on time.
///
/// Partial days are truncated, so a return a few hours after the due date is
/// not late.
pub fn days_late(due_date: DateTime<Utc>, return_date: DateTime<Utc>) -> i64 {
    (return_date - due_date).num_days().max(0)
}

/// Late fee accrued so far for a loan still out at `now`.
pub fn accrued_late_fee(due_date: DateTime<Utc>, now: DateTime<Utc>, policy: &LendingPolicy) -> u64 {
    late_fee(days_late(due_date, now), policy)
}

fn late_fee(days_late: i64, policy: &LendingPolicy) -> u64 {
    u64::try_from(days_late)
        .unwrap_or(0)
        .saturating_mul(policy.per_day_fine_rate)
}

/// Computes the fine for a return.
///
/// `total = days_late * per_day_fine_rate + lost * lost_book_surcharge
/// + damaged * damaged_book_surcharge`, saturating at `u64::MAX`.
pub fn assess<I>(
    due_date: DateTime<Utc>,
    return_date: DateTime<Utc>,
    conditions: I,
    policy: &LendingPolicy,
) -> FineAssessment
where
    I: IntoIterator<Item = BookCondition>,
{
    let (lost, damaged) = conditions
        .into_iter()
        .fold((0u64, 0u64), |(lost, damaged), condition| match condition {
            BookCondition::Lost => (lost + 1, damaged),
            BookCondition::Damaged => (lost, damaged + 1),
            BookCondition::Good => (lost, damaged),
        });

    let days_late = days_late(due_date, return_date);
    let late_fee = late_fee(days_late, policy);
    let loss_fee = lost.saturating_mul(policy.lost_book_surcharge);
    let damage_fee = damaged.saturating_mul(policy.damaged_book_surcharge);

    FineAssessment {
        days_late,
        late_fee,
        loss_fee,
        damage_fee,
        total: late_fee.saturating_add(loss_fee).saturating_add(damage_fee),
    }
}
