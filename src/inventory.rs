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

//! Append-only stock entries (purchases, donations).
//!
//! Entries are never edited or removed. The catalog appends to the ledger while
//! holding the book's lock, so a book's entry total and its stock counters move
//! together.

use crate::base::{BookId, EntryId, StaffId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stock addition requested by staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    pub book_id: BookId,
    pub staff_id: StaffId,
    pub quantity: u32,
    /// Where the copies came from, e.g. "Purchase" or "Donation".
    pub source: String,
    pub notes: Option<String>,
    pub date: DateTime<Utc>,
}

/// A recorded stock addition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookEntry {
    pub id: EntryId,
    #[serde(flatten)]
    pub entry: StockEntry,
}

#[derive(Debug)]
pub struct InventoryLedger {
    /// Entries per book, in append order.
    entries: DashMap<BookId, Vec<Arc<BookEntry>>>,
    next_id: AtomicU64,
}

impl InventoryLedger {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Records an entry and returns it with its assigned id.
    pub(crate) fn append(&self, entry: StockEntry) -> Arc<BookEntry> {
        let id = EntryId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let book_entry = Arc::new(BookEntry { id, entry });
        self.entries
            .entry(book_entry.entry.book_id)
            .or_default()
            .push(Arc::clone(&book_entry));
        book_entry
    }

    /// Entries recorded for a book, oldest first.
    pub fn entries_for(&self, book_id: &BookId) -> Vec<Arc<BookEntry>> {
        self.entries
            .get(book_id)
            .map(|entries| entries.value().clone())
            .unwrap_or_default()
    }

    /// Sum of quantities ever entered for a book.
    pub fn total_for(&self, book_id: &BookId) -> u64 {
        self.entries
            .get(book_id)
            .map(|entries| entries.iter().map(|e| u64::from(e.entry.quantity)).sum())
            .unwrap_or(0)
    }

    /// Number of entries across all books.
    pub fn len(&self) -> usize {
        self.entries.iter().map(|entries| entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InventoryLedger {
    fn default() -> Self {
        Self::new()
    }
}
