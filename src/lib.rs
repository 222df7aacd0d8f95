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

//! # Lending Ledger
//!
//! This library provides the lending engine of a physical library: a catalog of
//! books with finite stock, a registry of members and staff, and a ledger of
//! borrow/return transactions that keeps stock, due dates, and fines consistent
//! under concurrent access.
//!
//! ## Core Components
//!
//! - [`Engine`]: Checkout, return, and renewal processing
//! - [`Catalog`]: Books and their per-book stock counters
//! - [`PartyRegistry`]: Members, staff, and borrowing eligibility
//! - [`InventoryLedger`]: Append-only record of stock additions
//! - [`fine`]: Pure fine assessment
//! - [`LendingPolicy`]: Loan period, fine rates, and eligibility limits
//! - [`LendingError`]: Error types for lending failures
//!
//! ## Example
//!
//! ```
//! use chrono::{Duration, TimeZone, Utc};
//! use lending_ledger_rs::{
//!     BookCondition, BookId, BookInfo, Engine, MemberId, MemberInfo, StaffId, StaffInfo,
//!     StockEntry, TransactionStatus,
//! };
//! use std::collections::HashMap;
//!
//! let engine = Engine::new();
//! engine.parties().upsert_staff(StaffId(1), StaffInfo::default());
//! engine.parties().upsert_member(MemberId(1), MemberInfo::default());
//! engine.catalog().upsert_book(BookId(1), BookInfo::titled("1984"));
//!
//! let day = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
//! engine
//!     .add_entry(StockEntry {
//!         book_id: BookId(1),
//!         staff_id: StaffId(1),
//!         quantity: 2,
//!         source: "Purchase".into(),
//!         notes: None,
//!         date: day,
//!     })
//!     .unwrap();
//!
//! // Borrow one copy, due 14 days later
//! let tx = engine.checkout(MemberId(1), StaffId(1), &[BookId(1)], day).unwrap();
//! assert_eq!(tx.due_date, day + Duration::days(14));
//!
//! // Return it 20 days after borrowing: 6 days late
//! let conditions = HashMap::from([(BookId(1), BookCondition::Good)]);
//! let tx = engine
//!     .return_books(tx.id, &conditions, day + Duration::days(20))
//!     .unwrap();
//! assert_eq!(tx.status(), TransactionStatus::Returned);
//! assert_eq!(tx.fine, 6000);
//! ```
//!
//! ## Thread Safety
//!
//! Every book, member, and transaction has its own lock, so operations on
//! different records run in parallel. Checkouts racing for the last copy of a
//! book serialize on that book; exactly one succeeds.

pub mod base;
pub mod catalog;
pub mod config;
mod engine;
pub mod error;
pub mod fine;
pub mod inventory;
pub mod journal;
pub mod party;
mod reporting;
mod reservation;
pub mod transaction;

pub use base::{BookId, EntryId, MemberId, StaffId, TransactionId};
pub use catalog::{Book, BookInfo, Catalog};
pub use config::LendingPolicy;
pub use engine::Engine;
pub use error::{EntityRef, IneligibleReason, LendingError};
pub use fine::FineAssessment;
pub use inventory::{BookEntry, InventoryLedger, StockEntry};
pub use journal::{Journal, LedgerEvent};
pub use party::{Member, MemberInfo, PartyRegistry, Staff, StaffInfo};
pub use reporting::OverdueLoan;
pub use transaction::{BookCondition, Transaction, TransactionDetail, TransactionStatus};
