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

//! Catalog of books and their stock counters.
//!
//! Every copy of a book is in exactly one place:
//!
//! ```text
//!            add_entry
//!               │
//!               ▼
//!  stock ──reserve──► on_loan ──release(returned)──► stock
//!                        │
//!                        └──release(retired)──► retired
//! ```
//!
//! so `stock + on_loan + retired` always equals the total entered through the
//! inventory ledger. Each book's counters sit behind their own mutex; callers on
//! different books never contend.
//!
//! A removed book keeps its record, marked withdrawn, so its counters stay in
//! step with the ledger entries already recorded for it. Upserting the same id
//! lists it again with those counters intact.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use lending_ledger_rs::{BookId, BookInfo, Catalog, StaffId, StockEntry};
//!
//! let catalog = Catalog::new();
//! catalog.upsert_book(BookId(1), BookInfo::titled("Clean Code"));
//! catalog
//!     .add_entry(StockEntry {
//!         book_id: BookId(1),
//!         staff_id: StaffId(1),
//!         quantity: 3,
//!         source: "Donation".into(),
//!         notes: None,
//!         date: Utc::now(),
//!     })
//!     .unwrap();
//! assert_eq!(catalog.get_book(&BookId(1)).unwrap().stock, 3);
//! ```

use crate::base::BookId;
use crate::error::{EntityRef, LendingError};
use crate::inventory::{BookEntry, InventoryLedger, StockEntry};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Bibliographic fields of a book.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookInfo {
    /// Not enforced unique; catalog errors happen.
    pub isbn: Option<String>,
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub publish_year: Option<i32>,
    pub category: Option<String>,
    pub page_count: Option<u32>,
    pub shelf: Option<String>,
    pub description: Option<String>,
}

impl BookInfo {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Point-in-time view of a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Book {
    pub id: BookId,
    #[serde(flatten)]
    pub info: BookInfo,
    /// Copies on the shelf, available to borrow.
    pub stock: u32,
    /// Copies out on open transactions.
    pub on_loan: u32,
    /// Copies permanently removed from circulation.
    pub retired: u32,
    /// Sum of all inventory entries.
    pub total_entered: u64,
}

impl Book {
    /// Copies the library still owns (shelf plus loans).
    pub fn in_circulation(&self) -> u64 {
        u64::from(self.stock) + u64::from(self.on_loan)
    }
}

#[derive(Debug)]
struct BookData {
    id: BookId,
    info: BookInfo,
    stock: u32,
    on_loan: u32,
    retired: u32,
    total_entered: u64,
    /// Set when the book leaves the catalog; rejects reservations and entries.
    withdrawn: bool,
}

impl BookData {
    fn new(id: BookId, info: BookInfo) -> Self {
        Self {
            id,
            info,
            stock: 0,
            on_loan: 0,
            retired: 0,
            total_entered: 0,
            withdrawn: false,
        }
    }

    fn assert_invariants(&self) {
        debug_assert_eq!(
            u64::from(self.stock) + u64::from(self.on_loan) + u64::from(self.retired),
            self.total_entered,
            "Invariant violated: book {} copies do not add up to entries",
            self.id
        );
    }

    fn ensure_listed(&self) -> Result<(), LendingError> {
        if self.withdrawn {
            return Err(LendingError::NotFound(EntityRef::Book(self.id)));
        }
        Ok(())
    }

    /// Moves copies from the shelf to loan.
    fn reserve(&mut self, count: u32) -> Result<(), LendingError> {
        self.ensure_listed()?;
        if self.stock < count {
            return Err(LendingError::InsufficientStock { book_id: self.id });
        }
        self.stock -= count;
        self.on_loan += count;
        self.assert_invariants();
        Ok(())
    }

    /// Copies leaving loan for a `(returned, retired)` release.
    fn leaving(&self, returned: u32, retired: u32) -> Result<u32, LendingError> {
        returned
            .checked_add(retired)
            .filter(|&n| n <= self.on_loan)
            .ok_or_else(|| {
                LendingError::InvalidState(format!(
                    "book {} has {} copies on loan, cannot release {}",
                    self.id,
                    self.on_loan,
                    u64::from(returned) + u64::from(retired)
                ))
            })
    }

    /// Moves copies off loan, back to the shelf or into retirement.
    fn release(&mut self, returned: u32, retired: u32) -> Result<(), LendingError> {
        let leaving = self.leaving(returned, retired)?;
        self.on_loan -= leaving;
        self.stock += returned;
        self.retired += retired;
        self.assert_invariants();
        Ok(())
    }

    /// Adds newly acquired copies to the shelf.
    fn receive(&mut self, quantity: u32) -> Result<(), LendingError> {
        self.ensure_listed()?;
        if quantity == 0 {
            return Err(LendingError::ValidationError(
                "entry quantity must be positive".into(),
            ));
        }
        self.stock = self.stock.checked_add(quantity).ok_or_else(|| {
            LendingError::ValidationError(format!("stock overflow for book {}", self.id))
        })?;
        self.total_entered += u64::from(quantity);
        self.assert_invariants();
        Ok(())
    }

    fn snapshot(&self) -> Book {
        Book {
            id: self.id,
            info: self.info.clone(),
            stock: self.stock,
            on_loan: self.on_loan,
            retired: self.retired,
            total_entered: self.total_entered,
        }
    }
}

#[derive(Debug)]
struct BookRecord {
    inner: Mutex<BookData>,
}

/// Releases checked up front and applied together.
///
/// Built by [`Catalog::plan_release`] once every book has been found and holds
/// enough copies on loan. Copies on loan only leave through their own
/// transaction's release, and a book with copies out cannot be withdrawn, so
/// the checks still hold when [`ReleasePlan::apply`] runs.
#[derive(Debug)]
#[must_use = "a release plan does nothing until applied"]
pub(crate) struct ReleasePlan {
    steps: Vec<(Arc<BookRecord>, u32, u32)>,
}

impl ReleasePlan {
    pub(crate) fn apply(self) -> Result<(), LendingError> {
        for (record, returned, retired) in self.steps {
            record.inner.lock().release(returned, retired)?;
        }
        Ok(())
    }
}

/// Concurrent book store with per-book locking.
#[derive(Debug)]
pub struct Catalog {
    books: DashMap<BookId, Arc<BookRecord>>,
    inventory: InventoryLedger,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            books: DashMap::new(),
            inventory: InventoryLedger::new(),
        }
    }

    /// Clones the record handle out so no map guard outlives this call.
    ///
    /// Withdrawn records are returned too; callers that need a listed book
    /// check under the lock.
    fn record(&self, book_id: &BookId) -> Result<Arc<BookRecord>, LendingError> {
        self.books
            .get(book_id)
            .map(|r| Arc::clone(r.value()))
            .ok_or(LendingError::NotFound(EntityRef::Book(*book_id)))
    }

    /// Inserts a book or replaces its bibliographic fields.
    ///
    /// Stock counters of an existing book are left untouched. Upserting a
    /// removed book lists it again.
    pub fn upsert_book(&self, book_id: BookId, info: BookInfo) -> Book {
        let record = Arc::clone(
            self.books
                .entry(book_id)
                .or_insert_with(|| {
                    Arc::new(BookRecord {
                        inner: Mutex::new(BookData::new(book_id, BookInfo::default())),
                    })
                })
                .value(),
        );
        let mut data = record.inner.lock();
        data.info = info;
        data.withdrawn = false;
        data.snapshot()
    }

    pub fn get_book(&self, book_id: &BookId) -> Result<Book, LendingError> {
        let record = self.record(book_id)?;
        let data = record.inner.lock();
        data.ensure_listed()?;
        Ok(data.snapshot())
    }

    pub fn contains(&self, book_id: &BookId) -> bool {
        self.get_book(book_id).is_ok()
    }

    /// Takes `count` copies off the shelf.
    ///
    /// # Errors
    ///
    /// - [`LendingError::NotFound`] - Unknown or removed book.
    /// - [`LendingError::InsufficientStock`] - Fewer than `count` copies on the shelf.
    pub fn reserve_copies(&self, book_id: &BookId, count: u32) -> Result<(), LendingError> {
        self.record(book_id)?.inner.lock().reserve(count)
    }

    /// Ends the loan of `returned + retired` copies; `returned` go back on the
    /// shelf, `retired` leave circulation permanently.
    pub fn release_copies(
        &self,
        book_id: &BookId,
        returned: u32,
        retired: u32,
    ) -> Result<(), LendingError> {
        self.record(book_id)?.inner.lock().release(returned, retired)
    }

    /// Checks a batch of `(book, returned, retired)` releases without applying
    /// any of them.
    ///
    /// # Errors
    ///
    /// - [`LendingError::NotFound`] - Unknown book.
    /// - [`LendingError::InvalidState`] - A book has fewer copies on loan than
    ///   the batch releases.
    pub(crate) fn plan_release<I>(&self, releases: I) -> Result<ReleasePlan, LendingError>
    where
        I: IntoIterator<Item = (BookId, u32, u32)>,
    {
        let steps = releases
            .into_iter()
            .map(|(book_id, returned, retired)| {
                let record = self.record(&book_id)?;
                record.inner.lock().leaving(returned, retired)?;
                Ok((record, returned, retired))
            })
            .collect::<Result<Vec<_>, LendingError>>()?;
        Ok(ReleasePlan { steps })
    }

    /// Adds copies to a book and records the entry, as one step.
    pub fn add_entry(&self, entry: StockEntry) -> Result<Arc<BookEntry>, LendingError> {
        self.add_entry_then(entry, |_| {})
    }

    /// Like [`Catalog::add_entry`], running `committed` before the book's lock
    /// is released, so nothing can borrow the new copies before it returns.
    pub(crate) fn add_entry_then<F>(
        &self,
        entry: StockEntry,
        committed: F,
    ) -> Result<Arc<BookEntry>, LendingError>
    where
        F: FnOnce(&BookEntry),
    {
        let record = self.record(&entry.book_id)?;
        let mut data = record.inner.lock();
        data.receive(entry.quantity)?;
        let recorded = self.inventory.append(entry);
        committed(&recorded);
        drop(data);
        Ok(recorded)
    }

    /// Withdraws a book that has no copies on loan.
    ///
    /// The record stays behind, withdrawn, so its counters keep matching the
    /// inventory ledger.
    ///
    /// # Errors
    ///
    /// - [`LendingError::NotFound`] - Unknown or already removed book.
    /// - [`LendingError::InvalidState`] - A copy is still out.
    pub fn remove_book(&self, book_id: &BookId) -> Result<Book, LendingError> {
        let record = self.record(book_id)?;
        let mut data = record.inner.lock();
        data.ensure_listed()?;
        if data.on_loan > 0 {
            return Err(LendingError::InvalidState(format!(
                "book {} has {} copies on loan",
                book_id, data.on_loan
            )));
        }
        data.withdrawn = true;
        Ok(data.snapshot())
    }

    /// Snapshots of every listed book, in id order.
    pub fn books(&self) -> impl Iterator<Item = Book> {
        let mut records: Vec<(BookId, Arc<BookRecord>)> = self
            .books
            .iter()
            .map(|r| (*r.key(), Arc::clone(r.value())))
            .collect();
        records.sort_by_key(|(book_id, _)| *book_id);
        records.into_iter().filter_map(|(_, record)| {
            let data = record.inner.lock();
            (!data.withdrawn).then(|| data.snapshot())
        })
    }

    pub fn inventory(&self) -> &InventoryLedger {
        &self.inventory
    }

    /// Number of listed books.
    pub fn len(&self) -> usize {
        self.books().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
