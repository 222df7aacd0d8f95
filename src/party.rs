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

//! Members and staff.
//!
//! Besides contact details, each member carries their standing: open loans with
//! due dates, copies on loan, and unpaid fines. Eligibility is decided from the
//! standing alone, so checking it never touches transaction records.

use crate::base::{MemberId, StaffId, TransactionId};
use crate::config::LendingPolicy;
use crate::error::{EntityRef, IneligibleReason, LendingError};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub student_id: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Point-in-time view of a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub id: MemberId,
    #[serde(flatten)]
    pub info: MemberInfo,
    pub active: bool,
    pub outstanding_fine: u64,
    pub books_on_loan: u32,
    pub open_transactions: usize,
    /// Transactions ever opened by this member.
    pub transaction_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffInfo {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Staff {
    pub id: StaffId,
    #[serde(flatten)]
    pub info: StaffInfo,
}

#[derive(Debug, Clone, Copy)]
struct OpenLoan {
    due_date: DateTime<Utc>,
    books: u32,
}

#[derive(Debug)]
pub(crate) struct MemberData {
    id: MemberId,
    info: MemberInfo,
    active: bool,
    outstanding_fine: u64,
    open_loans: BTreeMap<TransactionId, OpenLoan>,
    books_on_loan: u32,
    transaction_count: u64,
}

impl MemberData {
    fn new(id: MemberId, info: MemberInfo) -> Self {
        Self {
            id,
            info,
            active: true,
            outstanding_fine: 0,
            open_loans: BTreeMap::new(),
            books_on_loan: 0,
            transaction_count: 0,
        }
    }

    fn assert_invariants(&self) {
        debug_assert_eq!(
            self.open_loans.values().map(|loan| loan.books).sum::<u32>(),
            self.books_on_loan,
            "Invariant violated: member {} loan count drifted",
            self.id
        );
    }

    /// Decides whether borrowing `requested` more books at `now` is allowed.
    pub(crate) fn check_eligibility(
        &self,
        requested: u32,
        now: DateTime<Utc>,
        policy: &LendingPolicy,
    ) -> Result<(), LendingError> {
        let deny = |reason| LendingError::EligibilityDenied {
            member_id: self.id,
            reason,
        };

        if !self.active {
            return Err(deny(IneligibleReason::Inactive));
        }
        if self.outstanding_fine > policy.eligibility_fine_ceiling {
            return Err(deny(IneligibleReason::UnpaidFines {
                outstanding: self.outstanding_fine,
                ceiling: policy.eligibility_fine_ceiling,
            }));
        }
        let grace = Duration::days(policy.overdue_grace_days);
        if let Some((transaction_id, loan)) = self
            .open_loans
            .iter()
            .find(|(_, loan)| now > loan.due_date + grace)
        {
            return Err(deny(IneligibleReason::OverdueLoans {
                transaction_id: *transaction_id,
                days_overdue: (now - loan.due_date).num_days(),
            }));
        }
        if self.books_on_loan.saturating_add(requested) > policy.max_books_on_loan {
            return Err(deny(IneligibleReason::LoanLimitReached {
                on_loan: self.books_on_loan,
                limit: policy.max_books_on_loan,
            }));
        }
        Ok(())
    }

    pub(crate) fn open_loan(
        &mut self,
        transaction_id: TransactionId,
        due_date: DateTime<Utc>,
        books: u32,
    ) {
        self.open_loans
            .insert(transaction_id, OpenLoan { due_date, books });
        self.books_on_loan += books;
        self.transaction_count += 1;
        self.assert_invariants();
    }

    /// Drops a returned loan from the standing and charges its fine.
    pub(crate) fn close_loan(&mut self, transaction_id: TransactionId, fine: u64) {
        if let Some(loan) = self.open_loans.remove(&transaction_id) {
            self.books_on_loan -= loan.books;
        }
        self.outstanding_fine = self.outstanding_fine.saturating_add(fine);
        self.assert_invariants();
    }

    pub(crate) fn extend_loan(&mut self, transaction_id: TransactionId, due_date: DateTime<Utc>) {
        if let Some(loan) = self.open_loans.get_mut(&transaction_id) {
            loan.due_date = due_date;
        }
    }

    /// Applies a fine payment and returns the remaining balance.
    pub(crate) fn settle(&mut self, amount: u64) -> Result<u64, LendingError> {
        if amount == 0 {
            return Err(LendingError::ValidationError(
                "payment amount must be positive".into(),
            ));
        }
        if amount > self.outstanding_fine {
            return Err(LendingError::ValidationError(format!(
                "payment {} exceeds outstanding fine {} for member {}",
                amount, self.outstanding_fine, self.id
            )));
        }
        self.outstanding_fine -= amount;
        Ok(self.outstanding_fine)
    }

    fn snapshot(&self) -> Member {
        Member {
            id: self.id,
            info: self.info.clone(),
            active: self.active,
            outstanding_fine: self.outstanding_fine,
            books_on_loan: self.books_on_loan,
            open_transactions: self.open_loans.len(),
            transaction_count: self.transaction_count,
        }
    }
}

#[derive(Debug)]
pub(crate) struct MemberRecord {
    pub(crate) inner: Mutex<MemberData>,
}

/// Concurrent member and staff registry.
#[derive(Debug)]
pub struct PartyRegistry {
    members: DashMap<MemberId, Arc<MemberRecord>>,
    staff: DashMap<StaffId, Staff>,
}

impl PartyRegistry {
    pub fn new() -> Self {
        Self {
            members: DashMap::new(),
            staff: DashMap::new(),
        }
    }

    pub(crate) fn member_record(
        &self,
        member_id: &MemberId,
    ) -> Result<Arc<MemberRecord>, LendingError> {
        self.members
            .get(member_id)
            .map(|r| Arc::clone(r.value()))
            .ok_or(LendingError::NotFound(EntityRef::Member(*member_id)))
    }

    /// Inserts a member or replaces their contact details, keeping standing.
    pub fn upsert_member(&self, member_id: MemberId, info: MemberInfo) -> Member {
        let record = Arc::clone(
            self.members
                .entry(member_id)
                .or_insert_with(|| {
                    Arc::new(MemberRecord {
                        inner: Mutex::new(MemberData::new(member_id, MemberInfo::default())),
                    })
                })
                .value(),
        );
        let mut data = record.inner.lock();
        data.info = info;
        data.snapshot()
    }

    pub fn get_member(&self, member_id: &MemberId) -> Result<Member, LendingError> {
        Ok(self.member_record(member_id)?.inner.lock().snapshot())
    }

    pub fn upsert_staff(&self, staff_id: StaffId, info: StaffInfo) -> Staff {
        let staff = Staff { id: staff_id, info };
        self.staff.insert(staff_id, staff.clone());
        staff
    }

    pub fn get_staff(&self, staff_id: &StaffId) -> Result<Staff, LendingError> {
        self.staff
            .get(staff_id)
            .map(|r| r.value().clone())
            .ok_or(LendingError::NotFound(EntityRef::Staff(*staff_id)))
    }

    /// Explains why a member may not borrow one more book at `now`.
    pub fn check_eligibility(
        &self,
        member_id: &MemberId,
        now: DateTime<Utc>,
        policy: &LendingPolicy,
    ) -> Result<(), LendingError> {
        self.member_record(member_id)?
            .inner
            .lock()
            .check_eligibility(1, now, policy)
    }

    /// Returns whether a member may borrow at `now`.
    ///
    /// # Errors
    ///
    /// [`LendingError::NotFound`] for an unknown member.
    pub fn is_member_eligible(
        &self,
        member_id: &MemberId,
        now: DateTime<Utc>,
        policy: &LendingPolicy,
    ) -> Result<bool, LendingError> {
        match self.check_eligibility(member_id, now, policy) {
            Ok(()) => Ok(true),
            Err(LendingError::EligibilityDenied { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Activates or deactivates a membership. Inactive members cannot borrow
    /// but may still return books.
    pub fn set_member_active(
        &self,
        member_id: &MemberId,
        active: bool,
    ) -> Result<Member, LendingError> {
        let record = self.member_record(member_id)?;
        let mut data = record.inner.lock();
        data.active = active;
        Ok(data.snapshot())
    }

    /// Deletes a member who has never borrowed.
    ///
    /// # Errors
    ///
    /// [`LendingError::InvalidState`] if the member has transaction history;
    /// deactivate them instead.
    pub fn remove_member(&self, member_id: &MemberId) -> Result<Member, LendingError> {
        let record = self.member_record(member_id)?;
        let snapshot = {
            let mut data = record.inner.lock();
            if data.transaction_count > 0 {
                return Err(LendingError::InvalidState(format!(
                    "member {} has transaction history",
                    member_id
                )));
            }
            // Keeps a racing checkout holding this record from borrowing.
            data.active = false;
            data.snapshot()
        };
        self.members.remove(member_id);
        Ok(snapshot)
    }

    pub fn members(&self) -> impl Iterator<Item = Member> {
        let mut records: Vec<(MemberId, Arc<MemberRecord>)> = self
            .members
            .iter()
            .map(|r| (*r.key(), Arc::clone(r.value())))
            .collect();
        records.sort_by_key(|(member_id, _)| *member_id);
        records
            .into_iter()
            .map(|(_, record)| record.inner.lock().snapshot())
    }
}

impl Default for PartyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
