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

//! Waitlist management for full sessions.
//!
//! One ordered queue per session. Positions are 1-based and dense across the
//! `Waiting` set: whenever an entry leaves that set (promoted, enrolled, or
//! cancelled) the remaining waiting entries are renumbered in place,
//! preserving relative order. Promotion marks the head entry `Notified` and
//! nothing more: no seat is held for it and no reservation is created; the
//! notified user must book again while the freed seat lasts. Losing that
//! race re-waitlists them at the back of the queue.

use crate::base::{EntryId, SessionId, UserId};
use crate::error::BookingError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WaitlistStatus {
    Waiting,
    Notified,
    Enrolled,
    Cancelled,
}

impl WaitlistStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitlistStatus::Waiting => "waiting",
            WaitlistStatus::Notified => "notified",
            WaitlistStatus::Enrolled => "enrolled",
            WaitlistStatus::Cancelled => "cancelled",
        }
    }

    /// Waiting and notified entries block a second enqueue by the same user.
    fn is_active(&self) -> bool {
        matches!(self, WaitlistStatus::Waiting | WaitlistStatus::Notified)
    }
}

/// A queued request for a seat in a full session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WaitlistEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub session_id: SessionId,
    pub position: u32,
    pub status: WaitlistStatus,
    pub created_at: DateTime<Utc>,
    pub notified_at: Option<DateTime<Utc>>,
    pub enrolled_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct WaitlistData {
    session_id: SessionId,
    /// Entries in enqueue order, including settled ones.
    entries: Vec<WaitlistEntry>,
}

impl WaitlistData {
    fn waiting_count(&self) -> u32 {
        self.entries
            .iter()
            .filter(|e| e.status == WaitlistStatus::Waiting)
            .count() as u32
    }

    /// Restores dense 1..n positions over the waiting set, preserving the
    /// current relative position order (a re-waitlisted entry keeps its
    /// place at the back rather than its original enqueue slot).
    fn renumber_waiting(&mut self) {
        let mut waiting: Vec<usize> = (0..self.entries.len())
            .filter(|&i| self.entries[i].status == WaitlistStatus::Waiting)
            .collect();
        waiting.sort_by_key(|&i| self.entries[i].position);
        for (rank, index) in waiting.into_iter().enumerate() {
            self.entries[index].position = rank as u32 + 1;
        }
    }

    fn enqueue(&mut self, user_id: UserId, now: DateTime<Utc>) -> Result<WaitlistEntry, BookingError> {
        if let Some(existing) = self
            .entries
            .iter()
            .position(|e| e.user_id == user_id && e.status.is_active())
        {
            // A notified user who lost the freed seat to a direct booking is
            // re-waitlisted at the back; a waiting user stays where they are.
            if self.entries[existing].status == WaitlistStatus::Waiting {
                return Err(BookingError::AlreadyWaitlisted);
            }
            let position = self.waiting_count() + 1;
            let entry = &mut self.entries[existing];
            entry.status = WaitlistStatus::Waiting;
            entry.position = position;
            return Ok(entry.clone());
        }

        let entry = WaitlistEntry {
            id: EntryId::new(),
            user_id,
            session_id: self.session_id,
            position: self.waiting_count() + 1,
            status: WaitlistStatus::Waiting,
            created_at: now,
            notified_at: None,
            enrolled_at: None,
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    fn promote_next(&mut self, now: DateTime<Utc>) -> Option<WaitlistEntry> {
        let next = self
            .entries
            .iter_mut()
            .filter(|e| e.status == WaitlistStatus::Waiting)
            .min_by_key(|e| e.position)?;

        next.status = WaitlistStatus::Notified;
        next.notified_at = Some(now);
        let promoted = next.clone();
        self.renumber_waiting();
        Some(promoted)
    }

    fn mark_enrolled(&mut self, entry_id: EntryId, now: DateTime<Utc>) -> Result<(), BookingError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or(BookingError::WaitlistEntryNotFound)?;

        // A waiting user who grabs a freed seat directly (before their turn
        // for promotion) is enrolled just the same.
        if !entry.status.is_active() {
            return Err(BookingError::InvalidTransition {
                from: entry.status.as_str().to_string(),
                to: WaitlistStatus::Enrolled.as_str().to_string(),
            });
        }
        entry.status = WaitlistStatus::Enrolled;
        entry.enrolled_at = Some(now);
        self.renumber_waiting();
        Ok(())
    }

    fn remove(&mut self, entry_id: EntryId, user_id: UserId) -> Result<WaitlistEntry, BookingError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or(BookingError::WaitlistEntryNotFound)?;

        if entry.user_id != user_id {
            return Err(BookingError::Validation(
                "waitlist entry belongs to a different user".to_string(),
            ));
        }
        if !entry.status.is_active() {
            return Err(BookingError::InvalidTransition {
                from: entry.status.as_str().to_string(),
                to: WaitlistStatus::Cancelled.as_str().to_string(),
            });
        }
        entry.status = WaitlistStatus::Cancelled;
        let removed = entry.clone();
        self.renumber_waiting();
        Ok(removed)
    }
}

/// Ordered per-session queue of users wanting a seat.
#[derive(Debug)]
pub struct Waitlist {
    inner: Mutex<WaitlistData>,
}

impl Waitlist {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            inner: Mutex::new(WaitlistData {
                session_id,
                entries: Vec::new(),
            }),
        }
    }

    /// Appends the user at the back of the waiting set.
    ///
    /// # Errors
    ///
    /// [`BookingError::AlreadyWaitlisted`] if the user already holds a
    /// waiting or notified entry here.
    pub fn enqueue(&self, user_id: UserId, now: DateTime<Utc>) -> Result<WaitlistEntry, BookingError> {
        self.inner.lock().enqueue(user_id, now)
    }

    /// Moves the smallest-position waiting entry to `Notified` and returns
    /// it, or `None` when nobody is waiting. Notification delivery is the
    /// caller's job.
    pub fn promote_next(&self, now: DateTime<Utc>) -> Option<WaitlistEntry> {
        self.inner.lock().promote_next(now)
    }

    /// Settles an active entry once its owner's booking confirms.
    pub fn mark_enrolled(&self, entry_id: EntryId, now: DateTime<Utc>) -> Result<(), BookingError> {
        self.inner.lock().mark_enrolled(entry_id, now)
    }

    /// Cancels a waiting or notified entry owned by `user_id`.
    pub fn remove(&self, entry_id: EntryId, user_id: UserId) -> Result<WaitlistEntry, BookingError> {
        self.inner.lock().remove(entry_id, user_id)
    }

    /// Cancels every waiting and notified entry, returning them for
    /// notification. Studio-initiated: used when the session itself is
    /// cancelled.
    pub fn cancel_active_entries(&self) -> Vec<WaitlistEntry> {
        let mut data = self.inner.lock();
        let mut cancelled = Vec::new();
        for entry in &mut data.entries {
            if entry.status.is_active() {
                entry.status = WaitlistStatus::Cancelled;
                cancelled.push(entry.clone());
            }
        }
        cancelled
    }

    /// The user's live (waiting or notified) entry, if any.
    pub fn active_entry_for(&self, user_id: UserId) -> Option<WaitlistEntry> {
        self.inner
            .lock()
            .entries
            .iter()
            .find(|e| e.user_id == user_id && e.status.is_active())
            .cloned()
    }

    /// All entries in enqueue order, settled ones included.
    pub fn entries(&self) -> Vec<WaitlistEntry> {
        self.inner.lock().entries.clone()
    }

    /// Waiting entries in position order.
    pub fn waiting_entries(&self) -> Vec<WaitlistEntry> {
        let data = self.inner.lock();
        let mut waiting: Vec<WaitlistEntry> = data
            .entries
            .iter()
            .filter(|e| e.status == WaitlistStatus::Waiting)
            .cloned()
            .collect();
        waiting.sort_by_key(|e| e.position);
        waiting
    }

    pub fn waiting_count(&self) -> u32 {
        self.inner.lock().waiting_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_assigns_dense_positions() {
        let now = Utc::now();
        let waitlist = Waitlist::new(SessionId(1));

        let first = waitlist.enqueue(UserId(1), now).unwrap();
        let second = waitlist.enqueue(UserId(2), now).unwrap();
        let third = waitlist.enqueue(UserId(3), now).unwrap();

        assert_eq!(first.position, 1);
        assert_eq!(second.position, 2);
        assert_eq!(third.position, 3);
    }

    #[test]
    fn duplicate_enqueue_rejected() {
        let now = Utc::now();
        let waitlist = Waitlist::new(SessionId(1));
        waitlist.enqueue(UserId(1), now).unwrap();
        assert_eq!(
            waitlist.enqueue(UserId(1), now),
            Err(BookingError::AlreadyWaitlisted)
        );
    }

    #[test]
    fn notified_entry_re_enqueues_at_back() {
        let now = Utc::now();
        let waitlist = Waitlist::new(SessionId(1));
        let entry = waitlist.enqueue(UserId(1), now).unwrap();
        waitlist.enqueue(UserId(2), now).unwrap();
        waitlist.promote_next(now).unwrap();

        // User 1 was notified but lost the seat; they rejoin behind user 2,
        // keeping the same entry.
        let requeued = waitlist.enqueue(UserId(1), now).unwrap();
        assert_eq!(requeued.id, entry.id);
        assert_eq!(requeued.status, WaitlistStatus::Waiting);
        assert_eq!(requeued.position, 2);

        // Order survives later renumbering: user 2 is promoted first.
        let promoted = waitlist.promote_next(now).unwrap();
        assert_eq!(promoted.user_id, UserId(2));
        let waiting = waitlist.waiting_entries();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].user_id, UserId(1));
        assert_eq!(waiting[0].position, 1);
    }

    #[test]
    fn promote_follows_position_order() {
        let now = Utc::now();
        let waitlist = Waitlist::new(SessionId(1));
        waitlist.enqueue(UserId(1), now).unwrap();
        waitlist.enqueue(UserId(2), now).unwrap();

        let promoted = waitlist.promote_next(now).unwrap();
        assert_eq!(promoted.user_id, UserId(1));
        assert_eq!(promoted.status, WaitlistStatus::Notified);
        assert_eq!(promoted.notified_at, Some(now));

        let promoted = waitlist.promote_next(now).unwrap();
        assert_eq!(promoted.user_id, UserId(2));
    }

    #[test]
    fn promote_empty_waitlist_is_noop() {
        let now = Utc::now();
        let waitlist = Waitlist::new(SessionId(1));
        assert!(waitlist.promote_next(now).is_none());
    }

    #[test]
    fn removal_renumbers_remaining_waiting() {
        let now = Utc::now();
        let waitlist = Waitlist::new(SessionId(1));
        let first = waitlist.enqueue(UserId(1), now).unwrap();
        waitlist.enqueue(UserId(2), now).unwrap();
        waitlist.enqueue(UserId(3), now).unwrap();

        waitlist.remove(first.id, UserId(1)).unwrap();

        let waiting = waitlist.waiting_entries();
        assert_eq!(waiting.len(), 2);
        assert_eq!(waiting[0].user_id, UserId(2));
        assert_eq!(waiting[0].position, 1);
        assert_eq!(waiting[1].user_id, UserId(3));
        assert_eq!(waiting[1].position, 2);

        // The next enqueue slots in behind them without a collision.
        let fourth = waitlist.enqueue(UserId(4), now).unwrap();
        assert_eq!(fourth.position, 3);
    }

    #[test]
    fn remove_checks_ownership() {
        let now = Utc::now();
        let waitlist = Waitlist::new(SessionId(1));
        let entry = waitlist.enqueue(UserId(1), now).unwrap();
        assert!(matches!(
            waitlist.remove(entry.id, UserId(2)),
            Err(BookingError::Validation(_))
        ));
    }

    #[test]
    fn remove_unknown_entry_fails() {
        let waitlist = Waitlist::new(SessionId(1));
        assert_eq!(
            waitlist.remove(EntryId::new(), UserId(1)),
            Err(BookingError::WaitlistEntryNotFound)
        );
    }

    #[test]
    fn cancelled_entry_allows_re_enqueue() {
        let now = Utc::now();
        let waitlist = Waitlist::new(SessionId(1));
        let entry = waitlist.enqueue(UserId(1), now).unwrap();
        waitlist.remove(entry.id, UserId(1)).unwrap();

        let again = waitlist.enqueue(UserId(1), now).unwrap();
        assert_eq!(again.position, 1);
    }

    #[test]
    fn enrolled_settles_notified_entry() {
        let now = Utc::now();
        let waitlist = Waitlist::new(SessionId(1));
        let entry = waitlist.enqueue(UserId(1), now).unwrap();
        waitlist.promote_next(now).unwrap();

        waitlist.mark_enrolled(entry.id, now).unwrap();
        let entries = waitlist.entries();
        assert_eq!(entries[0].status, WaitlistStatus::Enrolled);
        assert_eq!(entries[0].enrolled_at, Some(now));
    }

    #[test]
    fn enrolling_a_waiting_entry_renumbers_the_rest() {
        let now = Utc::now();
        let waitlist = Waitlist::new(SessionId(1));
        let entry = waitlist.enqueue(UserId(1), now).unwrap();
        waitlist.enqueue(UserId(2), now).unwrap();

        waitlist.mark_enrolled(entry.id, now).unwrap();

        let waiting = waitlist.waiting_entries();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].user_id, UserId(2));
        assert_eq!(waiting[0].position, 1);
    }

    #[test]
    fn enroll_requires_an_active_entry() {
        let now = Utc::now();
        let waitlist = Waitlist::new(SessionId(1));
        let entry = waitlist.enqueue(UserId(1), now).unwrap();
        waitlist.remove(entry.id, UserId(1)).unwrap();

        let result = waitlist.mark_enrolled(entry.id, now);
        assert_eq!(
            result,
            Err(BookingError::InvalidTransition {
                from: "cancelled".to_string(),
                to: "enrolled".to_string()
            })
        );
    }

    #[test]
    fn cancel_active_entries_clears_the_queue() {
        let now = Utc::now();
        let waitlist = Waitlist::new(SessionId(1));
        waitlist.enqueue(UserId(1), now).unwrap();
        waitlist.enqueue(UserId(2), now).unwrap();
        waitlist.promote_next(now).unwrap();

        let cancelled = waitlist.cancel_active_entries();
        assert_eq!(cancelled.len(), 2);
        assert_eq!(waitlist.waiting_count(), 0);
        assert!(waitlist.active_entry_for(UserId(1)).is_none());
    }

    #[test]
    fn promotion_renumbers_behind_the_notified_entry() {
        let now = Utc::now();
        let waitlist = Waitlist::new(SessionId(1));
        waitlist.enqueue(UserId(1), now).unwrap();
        waitlist.enqueue(UserId(2), now).unwrap();
        waitlist.enqueue(UserId(3), now).unwrap();

        waitlist.promote_next(now).unwrap();

        let waiting = waitlist.waiting_entries();
        assert_eq!(waiting.len(), 2);
        assert_eq!(waiting[0].user_id, UserId(2));
        assert_eq!(waiting[0].position, 1);
        assert_eq!(waiting[1].position, 2);
    }
}
