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

//! Lock-free journal of committed lending events.
//!
//! Every successful engine operation appends one event after its state changes
//! are visible. Consumers drain the journal in FIFO order.

use crate::base::{BookId, EntryId, MemberId, StaffId, TransactionId};
use crate::transaction::BookCondition;
use chrono::{DateTime, Utc};
use crossbeam::queue::SegQueue;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    BooksCheckedOut {
        transaction_id: TransactionId,
        member_id: MemberId,
        staff_id: StaffId,
        book_ids: Vec<BookId>,
        due_date: DateTime<Utc>,
    },
    BooksReturned {
        transaction_id: TransactionId,
        member_id: MemberId,
        conditions: Vec<(BookId, BookCondition)>,
        fine: u64,
        return_date: DateTime<Utc>,
    },
    LoanRenewed {
        transaction_id: TransactionId,
        due_date: DateTime<Utc>,
        renewals: u32,
    },
    StockEntered {
        entry_id: EntryId,
        book_id: BookId,
        staff_id: StaffId,
        quantity: u32,
    },
    FinePaid {
        member_id: MemberId,
        amount: u64,
        remaining: u64,
    },
}

/// Unbounded multi-producer event queue.
#[derive(Debug)]
pub struct Journal {
    events: SegQueue<LedgerEvent>,
}

impl Journal {
    pub fn new() -> Self {
        Self {
            events: SegQueue::new(),
        }
    }

    pub(crate) fn push(&self, event: LedgerEvent) {
        self.events.push(event);
    }

    /// Removes and returns every queued event, oldest first.
    pub fn drain(&self) -> Vec<LedgerEvent> {
        std::iter::from_fn(|| self.events.pop()).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}
