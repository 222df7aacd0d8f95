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

//! Lending engine.
//!
//! The [`Engine`] is the central component that moves books between the shelf
//! and members. It owns the catalog, the party registry, the transaction
//! ledger, and the event journal, and applies the [`LendingPolicy`].
//!
//! # Operations
//!
//! - **Checkout**: Reserve one copy of each requested book for an eligible
//!   member, all or nothing, and open a transaction.
//! - **Return**: Record each book's condition, put copies back on the shelf or
//!   retire them, and finalize the fine.
//! - **Renew**: Push back the due date of an open, not yet overdue loan.
//! - **Stock entry**: Add purchased or donated copies.
//!
//! # Journal Order
//!
//! Each operation pushes its event before any of its effects can be observed
//! by another operation: under the book lock for stock entries, under the
//! member lock for checkouts and payments, and under the transaction lock,
//! ahead of releasing copies, for returns and renewals. An operation that
//! depends on an earlier commit is therefore always journaled after it, and
//! replaying the journal in order never oversells a book.
//!
//! # Thread Safety
//!
//! Records live in [`DashMap`]s behind `Arc`s, each with its own mutex. Locks
//! are always taken in the order transaction, member, book, and map guards are
//! dropped before any record lock is taken, so concurrent callers cannot
//! deadlock. Two checkouts racing for the last copy serialize on that book's
//! lock; exactly one wins.

use crate::base::{BookId, MemberId, StaffId, TransactionId};
use crate::catalog::Catalog;
use crate::config::LendingPolicy;
use crate::error::{EntityRef, LendingError};
use crate::fine;
use crate::inventory::{BookEntry, StockEntry};
use crate::journal::{Journal, LedgerEvent};
use crate::party::PartyRegistry;
use crate::reservation::Reservation;
use crate::transaction::{BookCondition, Transaction, TransactionStatus};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub(crate) struct TransactionRecord {
    pub(crate) inner: Mutex<Transaction>,
}

/// Lending engine managing stock, members, and transactions.
///
/// # Invariants
///
/// - A book's `stock` never goes negative, and `stock + on_loan + retired`
///   equals the copies ever entered.
/// - A transaction is `Returned` exactly when every book has a condition and
///   the return date is set; the change happens under one lock.
/// - Fines are fixed once, at return.
/// - A failed checkout leaves no transaction and no reserved copy behind.
pub struct Engine {
    catalog: Catalog,
    parties: PartyRegistry,
    /// Transactions indexed by ID.
    transactions: DashMap<TransactionId, Arc<TransactionRecord>>,
    next_transaction_id: AtomicU64,
    journal: Journal,
    policy: LendingPolicy,
}

impl Engine {
    /// Creates an engine with the default policy and no records.
    pub fn new() -> Self {
        Self::with_policy(LendingPolicy::default())
    }

    pub fn with_policy(policy: LendingPolicy) -> Self {
        Engine {
            catalog: Catalog::new(),
            parties: PartyRegistry::new(),
            transactions: DashMap::new(),
            next_transaction_id: AtomicU64::new(1),
            journal: Journal::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &LendingPolicy {
        &self.policy
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn parties(&self) -> &PartyRegistry {
        &self.parties
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Removes and returns every journal event recorded so far.
    pub fn drain_events(&self) -> Vec<LedgerEvent> {
        self.journal.drain()
    }

    pub(crate) fn transaction_record(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Arc<TransactionRecord>, LendingError> {
        self.transactions
            .get(transaction_id)
            .map(|r| Arc::clone(r.value()))
            .ok_or(LendingError::NotFound(EntityRef::Transaction(*transaction_id)))
    }

    /// Handles to every transaction, in id order. No lock is held on return.
    pub(crate) fn transaction_records(&self) -> Vec<Arc<TransactionRecord>> {
        let mut records: Vec<(TransactionId, Arc<TransactionRecord>)> = self
            .transactions
            .iter()
            .map(|r| (*r.key(), Arc::clone(r.value())))
            .collect();
        records.sort_by_key(|(transaction_id, _)| *transaction_id);
        records.into_iter().map(|(_, record)| record).collect()
    }

    /// Snapshot of a single transaction.
    pub fn transaction(&self, transaction_id: &TransactionId) -> Result<Transaction, LendingError> {
        Ok(self.transaction_record(transaction_id)?.inner.lock().clone())
    }

    /// Returns whether a member may borrow at `now` under the engine's policy.
    pub fn is_member_eligible(
        &self,
        member_id: &MemberId,
        now: DateTime<Utc>,
    ) -> Result<bool, LendingError> {
        self.parties.is_member_eligible(member_id, now, &self.policy)
    }

    /// Lends one copy of each book in `book_ids` to a member.
    ///
    /// The member's record stays locked for the whole call, so concurrent
    /// checkouts for the same member cannot both slip under the loan limit.
    ///
    /// # Errors
    ///
    /// - [`LendingError::ValidationError`] - `book_ids` is empty or repeats a book.
    /// - [`LendingError::NotFound`] - Unknown staff, member, or book.
    /// - [`LendingError::EligibilityDenied`] - Member is restricted.
    /// - [`LendingError::InsufficientStock`] - A book has no copy on the shelf;
    ///   copies already reserved by this call are put back.
    pub fn checkout(
        &self,
        member_id: MemberId,
        staff_id: StaffId,
        book_ids: &[BookId],
        borrow_date: DateTime<Utc>,
    ) -> Result<Transaction, LendingError> {
        self.checkout_with_notes(member_id, staff_id, book_ids, borrow_date, None)
    }

    /// [`Engine::checkout`] with a free-text note kept on the transaction.
    pub fn checkout_with_notes(
        &self,
        member_id: MemberId,
        staff_id: StaffId,
        book_ids: &[BookId],
        borrow_date: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<Transaction, LendingError> {
        if book_ids.is_empty() {
            return Err(LendingError::ValidationError(
                "checkout requires at least one book".into(),
            ));
        }
        let mut seen = HashSet::with_capacity(book_ids.len());
        if let Some(duplicate) = book_ids.iter().find(|&&book_id| !seen.insert(book_id)) {
            return Err(LendingError::ValidationError(format!(
                "book {duplicate} requested more than once"
            )));
        }
        let count = u32::try_from(book_ids.len()).map_err(|_| {
            LendingError::ValidationError(format!("too many books: {}", book_ids.len()))
        })?;

        self.parties.get_staff(&staff_id)?;
        let member = self.parties.member_record(&member_id)?;
        let mut standing = member.inner.lock();
        standing.check_eligibility(count, borrow_date, &self.policy)?;

        let mut reservation = Reservation::new(&self.catalog);
        for &book_id in book_ids {
            reservation.reserve(book_id)?;
        }
        debug_assert_eq!(reservation.len(), book_ids.len());

        let transaction_id =
            TransactionId(self.next_transaction_id.fetch_add(1, Ordering::Relaxed));
        let due_date = borrow_date + Duration::days(self.policy.loan_period_days);
        let mut transaction = Transaction::new(
            transaction_id,
            member_id,
            staff_id,
            borrow_date,
            due_date,
            book_ids,
        );
        transaction.notes = notes;
        transaction.assert_invariants();

        // Journaled before the transaction becomes reachable for return or renewal
        self.journal.push(LedgerEvent::BooksCheckedOut {
            transaction_id,
            member_id,
            staff_id,
            book_ids: book_ids.to_vec(),
            due_date,
        });
        self.transactions.insert(
            transaction_id,
            Arc::new(TransactionRecord {
                inner: Mutex::new(transaction.clone()),
            }),
        );
        standing.open_loan(transaction_id, due_date, count);
        reservation.commit();
        drop(standing);

        tracing::debug!(
            transaction_id = %transaction_id,
            member_id = %member_id,
            books = ?book_ids,
            due_date = %due_date,
            "checkout committed"
        );

        Ok(transaction)
    }

    /// Closes a transaction, assessing each book's condition and the fine.
    ///
    /// | Condition | Copy goes to |
    /// |-----------|--------------|
    /// | Good | shelf |
    /// | Damaged | shelf, or retired when `damaged_returns_to_stock` is off |
    /// | Lost | retired |
    ///
    /// The fine is added to the member's outstanding balance.
    ///
    /// # Errors
    ///
    /// - [`LendingError::NotFound`] - Unknown transaction.
    /// - [`LendingError::InvalidState`] - Transaction already returned.
    /// - [`LendingError::ValidationError`] - `conditions` does not name exactly
    ///   the transaction's books, or `return_date` precedes the borrow date.
    pub fn return_books(
        &self,
        transaction_id: TransactionId,
        conditions: &HashMap<BookId, BookCondition>,
        return_date: DateTime<Utc>,
    ) -> Result<Transaction, LendingError> {
        self.return_books_with_notes(transaction_id, conditions, return_date, None)
    }

    /// [`Engine::return_books`] with a note, e.g. "Returned late, fine paid".
    ///
    /// A note replaces the one recorded at checkout; `None` keeps it.
    pub fn return_books_with_notes(
        &self,
        transaction_id: TransactionId,
        conditions: &HashMap<BookId, BookCondition>,
        return_date: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<Transaction, LendingError> {
        let record = self.transaction_record(&transaction_id)?;
        let mut transaction = record.inner.lock();

        if !transaction.is_open() {
            return Err(LendingError::InvalidState(format!(
                "transaction {transaction_id} is already returned"
            )));
        }
        if conditions.len() != transaction.details.len()
            || transaction
                .book_ids()
                .any(|book_id| !conditions.contains_key(&book_id))
        {
            return Err(LendingError::ValidationError(format!(
                "conditions must cover exactly the {} book(s) of transaction {}",
                transaction.details.len(),
                transaction_id
            )));
        }
        if return_date < transaction.borrow_date {
            return Err(LendingError::ValidationError(format!(
                "return date {} precedes borrow date {}",
                return_date, transaction.borrow_date
            )));
        }
        let member = self.parties.member_record(&transaction.member_id)?;

        let assessment = fine::assess(
            transaction.due_date,
            return_date,
            transaction.book_ids().map(|book_id| conditions[&book_id]),
            &self.policy,
        );

        // Every release is checked before anything changes
        let releases = self.catalog.plan_release(transaction.book_ids().map(|book_id| {
            match conditions[&book_id] {
                BookCondition::Good => (book_id, 1, 0),
                BookCondition::Damaged if self.policy.damaged_returns_to_stock => (book_id, 1, 0),
                BookCondition::Damaged | BookCondition::Lost => (book_id, 0, 1),
            }
        }))?;

        for detail in transaction.details.iter_mut() {
            detail.book_condition = Some(conditions[&detail.book_id]);
        }
        transaction.return_date = Some(return_date);
        transaction.fine = assessment.total;
        transaction.status = TransactionStatus::Returned;
        if notes.is_some() {
            transaction.notes = notes;
        }
        transaction.assert_invariants();
        let returned = transaction.clone();

        // Journaled before the copies and the member's standing are released
        self.journal.push(LedgerEvent::BooksReturned {
            transaction_id,
            member_id: returned.member_id,
            conditions: returned
                .details
                .iter()
                .filter_map(|d| d.book_condition.map(|c| (d.book_id, c)))
                .collect(),
            fine: returned.fine,
            return_date,
        });
        releases.apply()?;
        member.inner.lock().close_loan(transaction_id, assessment.total);
        drop(transaction);

        tracing::debug!(
            transaction_id = %transaction_id,
            member_id = %returned.member_id,
            days_late = assessment.days_late,
            fine = assessment.total,
            "return committed"
        );

        Ok(returned)
    }

    /// Extends an open loan to `now + loan_period_days`.
    ///
    /// Only the due date changes; stock is untouched.
    ///
    /// # Errors
    ///
    /// - [`LendingError::NotFound`] - Unknown transaction.
    /// - [`LendingError::InvalidState`] - Transaction returned, overdue at
    ///   `now`, or out of renewals.
    pub fn renew(
        &self,
        transaction_id: TransactionId,
        now: DateTime<Utc>,
    ) -> Result<Transaction, LendingError> {
        let record = self.transaction_record(&transaction_id)?;
        let mut transaction = record.inner.lock();

        match transaction.status_at(now) {
            TransactionStatus::Borrowed => {}
            TransactionStatus::Overdue => {
                return Err(LendingError::InvalidState(format!(
                    "transaction {transaction_id} is overdue and cannot be renewed"
                )));
            }
            TransactionStatus::Returned => {
                return Err(LendingError::InvalidState(format!(
                    "transaction {transaction_id} is already returned"
                )));
            }
        }
        if transaction.renewals >= self.policy.max_renewals {
            return Err(LendingError::InvalidState(format!(
                "transaction {} reached the renewal limit of {}",
                transaction_id, self.policy.max_renewals
            )));
        }
        let member = self.parties.member_record(&transaction.member_id)?;

        let due_date = transaction
            .due_date
            .max(now + Duration::days(self.policy.loan_period_days));
        transaction.due_date = due_date;
        transaction.renewals += 1;
        let renewed = transaction.clone();
        self.journal.push(LedgerEvent::LoanRenewed {
            transaction_id,
            due_date,
            renewals: renewed.renewals,
        });
        member.inner.lock().extend_loan(transaction_id, due_date);
        drop(transaction);

        tracing::debug!(
            transaction_id = %transaction_id,
            due_date = %due_date,
            renewals = renewed.renewals,
            "renewal committed"
        );

        Ok(renewed)
    }

    /// Adds copies of a book, recording who entered them.
    ///
    /// # Errors
    ///
    /// - [`LendingError::NotFound`] - Unknown staff or book.
    /// - [`LendingError::ValidationError`] - Zero quantity.
    pub fn add_entry(&self, entry: StockEntry) -> Result<Arc<BookEntry>, LendingError> {
        self.parties.get_staff(&entry.staff_id)?;
        let recorded = self.catalog.add_entry_then(entry, |recorded| {
            self.journal.push(LedgerEvent::StockEntered {
                entry_id: recorded.id,
                book_id: recorded.entry.book_id,
                staff_id: recorded.entry.staff_id,
                quantity: recorded.entry.quantity,
            });
        })?;

        tracing::debug!(
            entry_id = %recorded.id,
            book_id = %recorded.entry.book_id,
            quantity = recorded.entry.quantity,
            source = %recorded.entry.source,
            "stock entry committed"
        );

        Ok(recorded)
    }

    /// Records a fine payment; returns the member's remaining balance.
    ///
    /// # Errors
    ///
    /// - [`LendingError::NotFound`] - Unknown member.
    /// - [`LendingError::ValidationError`] - Zero amount or more than is owed.
    pub fn settle_fine(&self, member_id: MemberId, amount: u64) -> Result<u64, LendingError> {
        let member = self.parties.member_record(&member_id)?;
        let mut standing = member.inner.lock();
        let remaining = standing.settle(amount)?;
        self.journal.push(LedgerEvent::FinePaid {
            member_id,
            amount,
            remaining,
        });
        drop(standing);

        tracing::debug!(member_id = %member_id, amount, remaining, "fine payment committed");

        Ok(remaining)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
