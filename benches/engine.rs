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

//! Benchmarks for the lending engine.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Single-threaded checkout and return
//! - Checkout/return cycle throughput
//! - Contention on a small catalog
//! - Reporting over a large transaction set

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use lending_ledger_rs::{
    BookCondition, BookId, BookInfo, Engine, LendingPolicy, MemberId, MemberInfo, StaffId,
    StaffInfo, StockEntry,
};
use rayon::prelude::*;
use std::collections::HashMap;

// =============================================================================
// Helper Functions
// =============================================================================

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap() + Duration::days(n)
}

fn unlimited_policy() -> LendingPolicy {
    LendingPolicy {
        eligibility_fine_ceiling: u64::MAX,
        overdue_grace_days: 100_000,
        max_books_on_loan: u32::MAX,
        ..LendingPolicy::default()
    }
}

/// An engine with `members` members and `books` titles of `copies` copies each.
fn stocked_engine(members: u32, books: u32, copies: u32) -> Engine {
    let engine = Engine::with_policy(unlimited_policy());
    engine.parties().upsert_staff(StaffId(1), StaffInfo::default());
    for id in 1..=members {
        engine.parties().upsert_member(MemberId(id), MemberInfo::default());
    }
    for id in 1..=books {
        engine
            .catalog()
            .upsert_book(BookId(id), BookInfo::titled(format!("Book {id}")));
        engine
            .add_entry(StockEntry {
                book_id: BookId(id),
                staff_id: StaffId(1),
                quantity: copies,
                source: "Purchase".into(),
                notes: None,
                date: day(0),
            })
            .unwrap();
    }
    engine
}

fn all_good(books: &[BookId]) -> HashMap<BookId, BookCondition> {
    books.iter().map(|&b| (b, BookCondition::Good)).collect()
}

// =============================================================================
// Single-Threaded Benchmarks
// =============================================================================

fn bench_single_checkout(c: &mut Criterion) {
    c.bench_function("single_checkout", |b| {
        let engine = stocked_engine(1, 1, u32::MAX / 2);
        b.iter(|| {
            engine
                .checkout(MemberId(1), StaffId(1), black_box(&[BookId(1)]), day(0))
                .unwrap();
        })
    });
}

fn bench_checkout_return_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("checkout_return_cycle");
    let books = [BookId(1), BookId(2), BookId(3)];
    let conditions = all_good(&books);

    group.bench_function("on_time", |b| {
        let engine = stocked_engine(1, 3, 1);
        b.iter(|| {
            let tx = engine
                .checkout(MemberId(1), StaffId(1), &books, day(0))
                .unwrap();
            engine
                .return_books(tx.id, black_box(&conditions), day(10))
                .unwrap();
        })
    });

    group.bench_function("late", |b| {
        let engine = stocked_engine(1, 3, 1);
        b.iter(|| {
            let tx = engine
                .checkout(MemberId(1), StaffId(1), &books, day(0))
                .unwrap();
            engine
                .return_books(tx.id, black_box(&conditions), day(30))
                .unwrap();
        })
    });
    group.finish();
}

fn bench_checkout_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("checkout_throughput");

    for count in [100u32, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(u64::from(*count)));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let engine = stocked_engine(100, 50, count);
                for i in 0..count {
                    let book = BookId(i % 50 + 1);
                    engine
                        .checkout(MemberId(i % 100 + 1), StaffId(1), &[book], day(0))
                        .unwrap();
                }
                black_box(&engine);
            })
        });
    }
    group.finish();
}

// =============================================================================
// Multi-Threaded Benchmarks
// =============================================================================

fn bench_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("contention");
    let total_ops = 10_000u32;

    // Fewer titles = more threads competing for the same book locks
    for num_books in [1u32, 10, 100, 1_000].iter() {
        group.throughput(Throughput::Elements(u64::from(total_ops)));
        group.bench_with_input(
            BenchmarkId::new("books", num_books),
            num_books,
            |b, &num_books| {
                b.iter(|| {
                    let engine = stocked_engine(1_000, num_books, total_ops);
                    (0..total_ops).into_par_iter().for_each(|i| {
                        let book = BookId(i % num_books + 1);
                        let tx = engine
                            .checkout(MemberId(i % 1_000 + 1), StaffId(1), &[book], day(0))
                            .unwrap();
                        engine
                            .return_books(tx.id, &all_good(&[book]), day(3))
                            .unwrap();
                    });
                    black_box(&engine);
                })
            },
        );
    }
    group.finish();
}

fn bench_thread_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("thread_scaling");
    let total_checkouts = 20_000u32;

    for num_threads in [1, 2, 4, 8].iter() {
        group.throughput(Throughput::Elements(u64::from(total_checkouts)));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_threads),
            num_threads,
            |b, &num_threads| {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build()
                    .unwrap();

                b.iter(|| {
                    let engine = stocked_engine(1_000, 200, total_checkouts);
                    pool.install(|| {
                        (0..total_checkouts).into_par_iter().for_each(|i| {
                            let books = [BookId(i % 200 + 1), BookId((i + 1) % 200 + 1)];
                            engine
                                .checkout(MemberId(i % 1_000 + 1), StaffId(1), &books, day(0))
                                .unwrap();
                        });
                    });
                    black_box(&engine);
                })
            },
        );
    }
    group.finish();
}

// =============================================================================
// Reporting Benchmarks
// =============================================================================

fn bench_overdue_report(c: &mut Criterion) {
    let mut group = c.benchmark_group("overdue_report");

    for count in [1_000u32, 10_000].iter() {
        let engine = stocked_engine(500, 100, *count);
        for i in 0..*count {
            engine
                .checkout(
                    MemberId(i % 500 + 1),
                    StaffId(1),
                    &[BookId(i % 100 + 1)],
                    day(i64::from(i % 30)),
                )
                .unwrap();
        }

        group.throughput(Throughput::Elements(u64::from(*count)));
        group.bench_with_input(BenchmarkId::from_parameter(count), &engine, |b, engine| {
            b.iter(|| black_box(engine.overdue_report(day(40))))
        });
    }
    group.finish();
}

criterion_group!(single_threaded, bench_single_checkout, bench_checkout_return_cycle,);

criterion_group!(throughput, bench_checkout_throughput,);

criterion_group!(multi_threaded, bench_contention, bench_thread_scaling,);

criterion_group!(reporting, bench_overdue_report,);

criterion_main!(single_threaded, throughput, multi_threaded, reporting);
