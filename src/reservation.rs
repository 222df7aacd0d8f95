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

//! Scoped stock reservations.
//!
//! A [`Reservation`] collects copies taken from the catalog during one
//! operation. Unless [`Reservation::commit`] is called, dropping it puts every
//! copy back on the shelf, so any early return rolls the operation back.

use crate::base::BookId;
use crate::catalog::Catalog;
use crate::error::LendingError;

#[must_use = "dropping a reservation without committing releases its copies"]
pub(crate) struct Reservation<'a> {
    catalog: &'a Catalog,
    held: Vec<BookId>,
}

impl<'a> Reservation<'a> {
    pub(crate) fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            held: Vec::new(),
        }
    }

    /// Takes one copy of `book_id`, failing fast if none is on the shelf.
    pub(crate) fn reserve(&mut self, book_id: BookId) -> Result<(), LendingError> {
        self.catalog.reserve_copies(&book_id, 1)?;
        self.held.push(book_id);
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.held.len()
    }

    /// Keeps the reserved copies on loan and returns their book ids.
    pub(crate) fn commit(mut self) -> Vec<BookId> {
        std::mem::take(&mut self.held)
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        for book_id in self.held.drain(..).rev() {
            // A reserved book cannot leave the catalog while its copy is out.
            if let Err(e) = self.catalog.release_copies(&book_id, 1, 0) {
                tracing::error!("rollback of book {} reservation failed: {}", book_id, e);
            }
        }
    }
}
