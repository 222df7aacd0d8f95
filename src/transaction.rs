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

//! Lending transactions.
//!
//! Only two statuses are ever stored: a transaction is created `Borrowed` and
//! moves to `Returned` exactly once. `Overdue` is a read-time classification of
//! a `Borrowed` transaction whose due date has passed:
//!
//! ```text
//!  Borrowed ──return──► Returned
//!     │                    ▲
//!     └─(now > due)─► Overdue ──return (with fine)──┘
//! ```
//!
//! Loss is recorded per book through [`BookCondition::Lost`], never on the
//! transaction itself.

use crate::base::{BookId, MemberId, StaffId, TransactionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookCondition {
    Good,
    Damaged,
    Lost,
}

impl fmt::Display for BookCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Good => "GOOD",
            Self::Damaged => "DAMAGED",
            Self::Lost => "LOST",
        })
    }
}

impl FromStr for BookCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "good" => Ok(Self::Good),
            "damaged" => Ok(Self::Damaged),
            "lost" => Ok(Self::Lost),
            other => Err(format!("unknown book condition '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Borrowed,
    Overdue,
    Returned,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Borrowed => "BORROWED",
            Self::Overdue => "OVERDUE",
            Self::Returned => "RETURNED",
        })
    }
}

/// One book within a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDetail {
    pub book_id: BookId,
    /// Assessed at return; `None` while the book is out.
    pub book_condition: Option<BookCondition>,
}

/// One lending episode for one member, covering one or more books.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub member_id: MemberId,
    pub staff_id: StaffId,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub(crate) status: TransactionStatus,
    pub fine: u64,
    pub notes: Option<String>,
    pub renewals: u32,
    pub details: Vec<TransactionDetail>,
}

impl Transaction {
    pub(crate) fn new(
        id: TransactionId,
        member_id: MemberId,
        staff_id: StaffId,
        borrow_date: DateTime<Utc>,
        due_date: DateTime<Utc>,
        book_ids: &[BookId],
    ) -> Self {
        Self {
            id,
            member_id,
            staff_id,
            borrow_date,
            due_date,
            return_date: None,
            status: TransactionStatus::Borrowed,
            fine: 0,
            notes: None,
            renewals: 0,
            details: book_ids
                .iter()
                .map(|&book_id| TransactionDetail {
                    book_id,
                    book_condition: None,
                })
                .collect(),
        }
    }

    /// Stored status: `Borrowed` or `Returned`, never `Overdue`.
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Status as seen at `now`, classifying late open loans as `Overdue`.
    pub fn status_at(&self, now: DateTime<Utc>) -> TransactionStatus {
        match self.status {
            TransactionStatus::Borrowed if now > self.due_date => TransactionStatus::Overdue,
            status => status,
        }
    }

    /// Returns `true` while the books are out (including overdue).
    pub fn is_open(&self) -> bool {
        self.status != TransactionStatus::Returned
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) == TransactionStatus::Overdue
    }

    /// Whole days past the due date at `now`, zero when not late.
    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        (now - self.due_date).num_days().max(0)
    }

    pub fn book_ids(&self) -> impl Iterator<Item = BookId> + '_ {
        self.details.iter().map(|detail| detail.book_id)
    }

    /// Checks that the stored status agrees with the details and return date.
    pub(crate) fn assert_invariants(&self) {
        let resolved = self.details.iter().all(|d| d.book_condition.is_some());
        debug_assert!(
            self.status != TransactionStatus::Overdue,
            "Invariant violated: overdue stored on transaction {}",
            self.id
        );
        debug_assert_eq!(
            self.status == TransactionStatus::Returned,
            resolved && self.return_date.is_some(),
            "Invariant violated: transaction {} status {} disagrees with its details",
            self.id,
            self.status
        );
    }
}
