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

//! Error types for lending operations.

use crate::base::{BookId, MemberId, StaffId, TransactionId};
use std::fmt;
use thiserror::Error;

/// Reference to a record that a caller asked for by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Book(BookId),
    Member(MemberId),
    Staff(StaffId),
    Transaction(TransactionId),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Book(id) => write!(f, "book {id}"),
            Self::Member(id) => write!(f, "member {id}"),
            Self::Staff(id) => write!(f, "staff {id}"),
            Self::Transaction(id) => write!(f, "transaction {id}"),
        }
    }
}

/// Why a member may not borrow right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IneligibleReason {
    /// Membership has been deactivated.
    Inactive,
    /// An open loan is overdue by more than the grace period.
    OverdueLoans { transaction_id: TransactionId, days_overdue: i64 },
    /// Outstanding fines exceed the configured ceiling.
    UnpaidFines { outstanding: u64, ceiling: u64 },
    /// Borrowing would exceed the per-member loan limit.
    LoanLimitReached { on_loan: u32, limit: u32 },
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "membership is inactive"),
            Self::OverdueLoans {
                transaction_id,
                days_overdue,
            } => write!(
                f,
                "transaction {transaction_id} is {days_overdue} day(s) overdue"
            ),
            Self::UnpaidFines {
                outstanding,
                ceiling,
            } => write!(f, "unpaid fines {outstanding} exceed ceiling {ceiling}"),
            Self::LoanLimitReached { on_loan, limit } => {
                write!(f, "{on_loan} book(s) on loan, limit is {limit}")
            }
        }
    }
}

/// Lending operation errors.
///
/// Every variant is recoverable by the caller; the engine never retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LendingError {
    /// Referenced record does not exist
    #[error("{0} not found")]
    NotFound(EntityRef),

    /// Not enough copies on the shelf to satisfy a reservation
    #[error("insufficient stock for book {book_id}")]
    InsufficientStock { book_id: BookId },

    /// Member is restricted from borrowing
    #[error("member {member_id} is not eligible to borrow: {reason}")]
    EligibilityDenied {
        member_id: MemberId,
        reason: IneligibleReason,
    },

    /// Operation is illegal in the record's current state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed input
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Backing storage could not be reached
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}
