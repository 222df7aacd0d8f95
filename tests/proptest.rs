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

//! Property-based tests for the lending engine.
//!
//! These tests verify invariants that should hold for any sequence of
//! checkouts, returns, renewals, and stock entries.

use chrono::{DateTime, Duration, TimeZone, Utc};
use lending_ledger_rs::fine;
use lending_ledger_rs::{
    BookCondition, BookId, BookInfo, Engine, LendingError, LendingPolicy, MemberId, MemberInfo,
    StaffId, StaffInfo, StockEntry, TransactionStatus,
};
use proptest::prelude::*;
use std::collections::HashMap;

const BOOKS: u32 = 4;
const MEMBERS: u32 = 3;

// =============================================================================
// Helpers
// =============================================================================

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap()
}

/// Policy loose enough that eligibility never masks stock behavior.
fn permissive_policy() -> LendingPolicy {
    LendingPolicy {
        eligibility_fine_ceiling: u64::MAX,
        overdue_grace_days: 100_000,
        max_books_on_loan: u32::MAX,
        max_renewals: u32::MAX,
        ..LendingPolicy::default()
    }
}

fn engine_with_stock(policy: LendingPolicy, stock: &[u32]) -> Engine {
    let engine = Engine::with_policy(policy);
    engine.parties().upsert_staff(StaffId(1), StaffInfo::default());
    for id in 1..=MEMBERS {
        engine.parties().upsert_member(MemberId(id), MemberInfo::default());
    }
    for (i, &copies) in stock.iter().enumerate() {
        let book_id = BookId(i as u32 + 1);
        engine.catalog().upsert_book(book_id, BookInfo::titled(format!("Book {}", book_id)));
        if copies > 0 {
            engine
                .add_entry(StockEntry {
                    book_id,
                    staff_id: StaffId(1),
                    quantity: copies,
                    source: "Purchase".into(),
                    notes: None,
                    date: start(),
                })
                .unwrap();
        }
    }
    engine
}

fn arb_condition() -> impl Strategy<Value = BookCondition> {
    prop_oneof![
        3 => Just(BookCondition::Good),
        1 => Just(BookCondition::Damaged),
        1 => Just(BookCondition::Lost),
    ]
}

fn arb_books() -> impl Strategy<Value = Vec<BookId>> {
    prop::sample::subsequence((1..=BOOKS).map(BookId).collect::<Vec<_>>(), 1..=BOOKS as usize)
}

#[derive(Debug, Clone)]
enum Op {
    Checkout { member: u32, books: Vec<BookId> },
    Return { pick: usize, conditions: Vec<BookCondition> },
    Renew { pick: usize },
    Entry { book: u32, quantity: u32 },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (1..=MEMBERS, arb_books()).prop_map(|(member, books)| Op::Checkout { member, books }),
        3 => (any::<usize>(), prop::collection::vec(arb_condition(), BOOKS as usize))
            .prop_map(|(pick, conditions)| Op::Return { pick, conditions }),
        1 => any::<usize>().prop_map(|pick| Op::Renew { pick }),
        1 => (1..=BOOKS, 1u32..=3).prop_map(|(book, quantity)| Op::Entry { book, quantity }),
    ]
}

/// Applies `ops` one day apart and returns the engine.
fn replay(stock: &[u32], damaged_returns_to_stock: bool, ops: &[Op]) -> Engine {
    let engine = engine_with_stock(
        LendingPolicy {
            damaged_returns_to_stock,
            ..permissive_policy()
        },
        stock,
    );

    for (i, op) in ops.iter().enumerate() {
        let now = start() + Duration::days(i as i64);
        match op {
            Op::Checkout { member, books } => {
                let _ = engine.checkout(MemberId(*member), StaffId(1), books, now);
            }
            Op::Return { pick, conditions } => {
                let open: Vec<_> = engine.list_open_transactions(None).collect();
                if open.is_empty() {
                    continue;
                }
                let tx = &open[pick % open.len()];
                let map: HashMap<BookId, BookCondition> = tx
                    .book_ids()
                    .zip(conditions.iter().copied())
                    .collect();
                engine.return_books(tx.id, &map, now).unwrap();
            }
            Op::Renew { pick } => {
                let open: Vec<_> = engine.list_open_transactions(None).collect();
                if !open.is_empty() {
                    let _ = engine.renew(open[pick % open.len()].id, now);
                }
            }
            Op::Entry { book, quantity } => {
                engine
                    .add_entry(StockEntry {
                        book_id: BookId(*book),
                        staff_id: StaffId(1),
                        quantity: *quantity,
                        source: "Donation".into(),
                        notes: None,
                        date: now,
                    })
                    .unwrap();
            }
        }
    }
    engine
}

// =============================================================================
// Fine Policy Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Returning on or before the due date costs nothing without loss or damage.
    #[test]
    fn fine_zero_when_not_late(
        early_minutes in 0i64..=60 * 24 * 60,
        rate in 0u64..=100_000,
    ) {
        let policy = LendingPolicy { per_day_fine_rate: rate, ..LendingPolicy::default() };
        let due = start();
        let assessed = fine::assess(due, due - Duration::minutes(early_minutes), [BookCondition::Good], &policy);
        prop_assert_eq!(assessed.total, 0);
    }

    /// One more whole day late always costs strictly more.
    #[test]
    fn fine_strictly_increasing_in_days_late(
        days in 1i64..=3650,
        rate in 1u64..=100_000,
    ) {
        let policy = LendingPolicy { per_day_fine_rate: rate, ..LendingPolicy::default() };
        let due = start();
        let fewer = fine::assess(due, due + Duration::days(days), [BookCondition::Good], &policy);
        let more = fine::assess(due, due + Duration::days(days + 1), [BookCondition::Good], &policy);
        prop_assert!(more.total > fewer.total);
        prop_assert_eq!(fewer.total, days as u64 * rate);
    }

    /// The total is the sum of its parts.
    #[test]
    fn fine_total_is_sum_of_components(
        days in -30i64..=60,
        conditions in prop::collection::vec(arb_condition(), 1..6),
    ) {
        let policy = LendingPolicy { damaged_book_surcharge: 1500, ..LendingPolicy::default() };
        let due = start();
        let assessed = fine::assess(due, due + Duration::days(days), conditions.iter().copied(), &policy);
        prop_assert_eq!(assessed.total, assessed.late_fee + assessed.loss_fee + assessed.damage_fee);
        let lost = conditions.iter().filter(|c| **c == BookCondition::Lost).count() as u64;
        prop_assert_eq!(assessed.loss_fee, lost * policy.lost_book_surcharge);
    }
}

// =============================================================================
// Checkout Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// At most `stock` checkouts of a book succeed; the rest are out of stock.
    #[test]
    fn checkouts_never_exceed_stock(
        copies in 0u32..=6,
        attempts in 1usize..=12,
    ) {
        let engine = engine_with_stock(permissive_policy(), &[copies]);
        let mut granted = 0u32;
        for i in 0..attempts {
            let member = MemberId(i as u32 % MEMBERS + 1);
            match engine.checkout(member, StaffId(1), &[BookId(1)], start()) {
                Ok(_) => granted += 1,
                Err(e) => prop_assert_eq!(e, LendingError::InsufficientStock { book_id: BookId(1) }),
            }
        }
        prop_assert_eq!(granted, copies.min(attempts as u32));
        prop_assert_eq!(engine.catalog().get_book(&BookId(1)).unwrap().stock, copies - granted);
    }

    /// A checkout that fails for stock leaves every book and the ledger untouched.
    #[test]
    fn failed_checkout_changes_nothing(
        stock in prop::collection::vec(0u32..=2, BOOKS as usize),
        books in arb_books(),
    ) {
        let engine = engine_with_stock(permissive_policy(), &stock);
        let before: Vec<u32> = engine.catalog().books().map(|b| b.stock).collect();

        let result = engine.checkout(MemberId(1), StaffId(1), &books, start());
        let any_empty = books.iter().any(|b| stock[(b.0 - 1) as usize] == 0);

        if any_empty {
            prop_assert!(
                matches!(result, Err(LendingError::InsufficientStock { .. })),
                "expected insufficient stock, got {:?}",
                result
            );
            let after: Vec<u32> = engine.catalog().books().map(|b| b.stock).collect();
            prop_assert_eq!(before, after);
            prop_assert_eq!(engine.transactions().count(), 0);
        } else {
            prop_assert!(result.is_ok());
            for book in &books {
                let idx = (book.0 - 1) as usize;
                prop_assert_eq!(engine.catalog().get_book(book).unwrap().stock, stock[idx] - 1);
            }
        }
    }
}

// =============================================================================
// Ledger Invariant Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Copies on the shelf, on loan, and retired always add up to the copies
    /// entered, and open details account for exactly the copies on loan.
    #[test]
    fn copies_are_conserved(
        stock in prop::collection::vec(0u32..=3, BOOKS as usize),
        damaged_returns_to_stock in any::<bool>(),
        ops in prop::collection::vec(arb_op(), 1..40),
    ) {
        let engine = replay(&stock, damaged_returns_to_stock, &ops);

        let mut open_per_book: HashMap<BookId, u32> = HashMap::new();
        for tx in engine.list_open_transactions(None) {
            for book in tx.book_ids() {
                *open_per_book.entry(book).or_default() += 1;
            }
        }

        for book in engine.catalog().books() {
            let entered = engine.catalog().inventory().total_for(&book.id);
            prop_assert_eq!(book.total_entered, entered);
            prop_assert_eq!(
                u64::from(book.stock) + u64::from(book.on_loan) + u64::from(book.retired),
                entered
            );
            prop_assert_eq!(book.on_loan, open_per_book.get(&book.id).copied().unwrap_or(0));
        }
    }

    /// Returned exactly when every book has a condition and the return date is set.
    #[test]
    fn returned_iff_fully_resolved(
        stock in prop::collection::vec(1u32..=3, BOOKS as usize),
        ops in prop::collection::vec(arb_op(), 1..40),
    ) {
        let engine = replay(&stock, true, &ops);
        for tx in engine.transactions() {
            let resolved = tx.details.iter().all(|d| d.book_condition.is_some());
            let returned = tx.status() == TransactionStatus::Returned;
            prop_assert_eq!(returned, resolved && tx.return_date.is_some());
            if !returned {
                prop_assert!(tx.details.iter().all(|d| d.book_condition.is_none()));
                prop_assert_eq!(tx.fine, 0);
            }
        }
    }

    /// Member standing mirrors the open transactions and fines charged.
    #[test]
    fn member_standing_matches_ledger(
        stock in prop::collection::vec(1u32..=3, BOOKS as usize),
        ops in prop::collection::vec(arb_op(), 1..40),
    ) {
        let engine = replay(&stock, true, &ops);
        for member in engine.parties().members() {
            let history = engine.member_history(member.id).unwrap();
            let on_loan: usize = history.iter().filter(|t| t.is_open()).map(|t| t.details.len()).sum();
            let fines: u64 = history.iter().map(|t| t.fine).sum();
            prop_assert_eq!(member.books_on_loan as usize, on_loan);
            prop_assert_eq!(member.outstanding_fine, fines);
            prop_assert_eq!(member.transaction_count as usize, history.len());
        }
    }

    /// A lost return leaves the shelf count alone and shrinks circulation by one.
    #[test]
    fn lost_return_retires_one_copy(
        copies in 1u32..=5,
        days in 0i64..=30,
    ) {
        let engine = engine_with_stock(permissive_policy(), &[copies]);
        let tx = engine.checkout(MemberId(1), StaffId(1), &[BookId(1)], start()).unwrap();
        let before = engine.catalog().get_book(&BookId(1)).unwrap();

        let conditions = HashMap::from([(BookId(1), BookCondition::Lost)]);
        engine.return_books(tx.id, &conditions, start() + Duration::days(days)).unwrap();
        let after = engine.catalog().get_book(&BookId(1)).unwrap();

        prop_assert_eq!(after.stock, before.stock);
        prop_assert_eq!(after.in_circulation(), before.in_circulation() - 1);
        prop_assert_eq!(after.retired, 1);

        // The retired copy can never be lent again
        let mut lendable = 0;
        while engine.checkout(MemberId(2), StaffId(1), &[BookId(1)], start()).is_ok() {
            lendable += 1;
        }
        prop_assert_eq!(lendable, copies - 1);
    }
}
