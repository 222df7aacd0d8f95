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

//! Read-only projections over committed transactions.
//!
//! Queries take a snapshot of the transaction handles up front and clone each
//! record lazily as the iterator advances, so a long report never blocks
//! checkouts or returns.

use crate::base::{MemberId, TransactionId};
use crate::engine::Engine;
use crate::error::LendingError;
use crate::fine;
use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// An open loan past its due date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverdueLoan {
    pub transaction_id: TransactionId,
    pub member_id: MemberId,
    pub due_date: DateTime<Utc>,
    pub books: usize,
    pub days_overdue: i64,
    /// Late fee the member would owe if the books came back at the report time.
    pub accrued_fine: u64,
}

impl Engine {
    fn snapshots(&self) -> impl Iterator<Item = Transaction> + '_ {
        self.transaction_records()
            .into_iter()
            .map(|record| record.inner.lock().clone())
    }

    /// Every transaction, open or returned, in id order.
    pub fn transactions(&self) -> impl Iterator<Item = Transaction> + '_ {
        self.snapshots()
    }

    /// Open transactions, optionally for one member, in id order.
    pub fn list_open_transactions(
        &self,
        member_id: Option<MemberId>,
    ) -> impl Iterator<Item = Transaction> + '_ {
        self.snapshots().filter(move |transaction| {
            transaction.is_open() && member_id.is_none_or(|id| transaction.member_id == id)
        })
    }

    /// Open transactions whose due date is before `now`.
    pub fn get_overdue(&self, now: DateTime<Utc>) -> impl Iterator<Item = Transaction> + '_ {
        self.snapshots()
            .filter(move |transaction| transaction.is_overdue(now))
    }

    /// Overdue loans with days late and the late fee accrued at `now`.
    pub fn overdue_report(&self, now: DateTime<Utc>) -> Vec<OverdueLoan> {
        self.get_overdue(now)
            .map(|transaction| OverdueLoan {
                transaction_id: transaction.id,
                member_id: transaction.member_id,
                due_date: transaction.due_date,
                books: transaction.details.len(),
                days_overdue: transaction.days_overdue(now),
                accrued_fine: fine::accrued_late_fee(transaction.due_date, now, self.policy()),
            })
            .collect()
    }

    /// Every transaction of a member, open or returned, in id order.
    ///
    /// # Errors
    ///
    /// [`LendingError::NotFound`] for an unknown member.
    pub fn member_history(&self, member_id: MemberId) -> Result<Vec<Transaction>, LendingError> {
        self.parties().get_member(&member_id)?;
        Ok(self
            .snapshots()
            .filter(|transaction| transaction.member_id == member_id)
            .collect())
    }
}
