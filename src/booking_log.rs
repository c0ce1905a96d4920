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

//! Active-booking index with a FIFO commit log.
//!
//! Enforces the storage-level uniqueness rule: at most one live (confirmed
//! or attended) reservation per (user, session) pair. The claim uses the
//! map's entry API for an atomic check-and-insert, so two callers racing to
//! book the same pair cannot both win.

use crate::base::{ReservationId, SessionId, UserId};
use crate::error::BookingError;
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Tracks which (user, session) pairs hold a live reservation, and the order
/// in which reservations were committed.
#[derive(Debug, Default)]
pub struct ReservationBook {
    /// Live claims indexed by pair for O(1) duplicate detection.
    active: DashMap<(UserId, SessionId), ReservationId>,

    /// Reservation IDs in commit (FIFO) order.
    committed: SegQueue<ReservationId>,
}

impl ReservationBook {
    pub fn new() -> Self {
        Self {
            active: DashMap::new(),
            committed: SegQueue::new(),
        }
    }

    /// Atomically claims the (user, session) pair for a reservation being
    /// created.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::DuplicateReservation`] if the pair already
    /// holds a live reservation.
    pub fn claim(
        &self,
        user_id: UserId,
        session_id: SessionId,
        reservation_id: ReservationId,
    ) -> Result<(), BookingError> {
        match self.active.entry((user_id, session_id)) {
            Entry::Occupied(_) => Err(BookingError::DuplicateReservation),
            Entry::Vacant(entry) => {
                entry.insert(reservation_id);
                Ok(())
            }
        }
    }

    /// Appends a successfully persisted reservation to the commit log.
    pub fn commit(&self, reservation_id: ReservationId) {
        self.committed.push(reservation_id);
    }

    /// Releases a claim, either rolling back a failed booking or settling a
    /// cancellation/no-show. Unknown pairs are ignored.
    pub fn release(&self, user_id: UserId, session_id: SessionId) {
        self.active.remove(&(user_id, session_id));
    }

    /// True iff the pair currently holds a live reservation.
    pub fn is_active(&self, user_id: UserId, session_id: SessionId) -> bool {
        self.active.contains_key(&(user_id, session_id))
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Drains the commit log, yielding reservation IDs in creation order.
    /// Used for end-of-run reporting; concurrent commits during the drain
    /// land in a later drain.
    pub fn drain_committed(&self) -> Vec<ReservationId> {
        let mut ids = Vec::with_capacity(self.committed.len());
        while let Some(id) = self.committed.pop() {
            ids.push(id);
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_rejects_duplicates() {
        let book = ReservationBook::new();
        let pair = (UserId(1), SessionId(1));

        book.claim(pair.0, pair.1, ReservationId::new()).unwrap();
        assert_eq!(
            book.claim(pair.0, pair.1, ReservationId::new()),
            Err(BookingError::DuplicateReservation)
        );
    }

    #[test]
    fn release_frees_the_pair() {
        let book = ReservationBook::new();
        book.claim(UserId(1), SessionId(1), ReservationId::new()).unwrap();
        book.release(UserId(1), SessionId(1));
        assert!(!book.is_active(UserId(1), SessionId(1)));
        book.claim(UserId(1), SessionId(1), ReservationId::new()).unwrap();
    }

    #[test]
    fn same_user_different_sessions_coexist() {
        let book = ReservationBook::new();
        book.claim(UserId(1), SessionId(1), ReservationId::new()).unwrap();
        book.claim(UserId(1), SessionId(2), ReservationId::new()).unwrap();
        assert_eq!(book.active_count(), 2);
    }

    #[test]
    fn drain_preserves_commit_order() {
        let book = ReservationBook::new();
        let first = ReservationId::new();
        let second = ReservationId::new();
        book.commit(first);
        book.commit(second);

        assert_eq!(book.drain_committed(), vec![first, second]);
        assert!(book.drain_committed().is_empty());
    }
}
