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

//! Booking engine.
//!
//! The [`BookingEngine`] is the central component that decides whether a
//! user may occupy a seat in a scheduled session, debits the prepaid credit
//! balance, enforces capacity, and drives the waitlist on cancellation.
//!
//! # Booking
//!
//! A booking claims the seat first and debits the credit second: seats are
//! the scarcer, more contended resource, and a failed debit is cheap to
//! compensate by releasing the seat again. A full session is not an error;
//! the request lands on the session's waitlist instead.
//!
//! # Cancellation
//!
//! Cancelling a confirmed reservation refunds exactly one credit to the
//! grant it was debited from, frees exactly one seat, and promotes the head
//! of the waitlist. The status transition commits first under the
//! reservation's exclusive reference; once a caller wins that transition the
//! compensations cannot fail, so no interleaving observes a freed seat
//! without its refund.
//!
//! # Thread Safety
//!
//! Entities live in [`DashMap`]s and guard their own counters with a
//! per-entity lock, so operations on different sessions and grants run in
//! parallel while two callers racing for the same last seat or last credit
//! serialize on that entity.

use crate::base::{EntryId, GrantId, ReservationId, SessionId, UserId};
use crate::booking_log::ReservationBook;
use crate::error::BookingError;
use crate::grant::{CreditGrant, GrantSnapshot};
use crate::notify::{NotificationKind, NotificationSink, NullSink, RelatedEntity};
use crate::policy::BookingPolicy;
use crate::reservation::{Reservation, ReservationSnapshot, ReservationStatus};
use crate::session::{Session, SessionSnapshot};
use crate::waitlist::{Waitlist, WaitlistEntry};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The two successful outcomes of a booking request.
///
/// A full session redirects the request to the waitlist by design; the
/// caller distinguishes the outcomes, not success from failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingOutcome {
    /// A seat was claimed and a credit debited.
    Confirmed(ReservationSnapshot),
    /// The session was full; the user now waits at `position`.
    Waitlisted { entry_id: EntryId, position: u32 },
}

/// Booking engine managing sessions, credit grants, reservations, and
/// waitlists.
pub struct BookingEngine {
    sessions: DashMap<SessionId, Session>,
    grants: DashMap<GrantId, CreditGrant>,
    /// Grant IDs per user, for qualifying-grant selection.
    user_grants: DashMap<UserId, Vec<GrantId>>,
    reservations: DashMap<ReservationId, Reservation>,
    waitlists: DashMap<SessionId, Waitlist>,
    /// Waitlist entry → owning session, for entry-addressed operations.
    entry_sessions: DashMap<EntryId, SessionId>,
    /// Live (user, session) claims and the FIFO commit log.
    book: ReservationBook,
    notifier: Arc<dyn NotificationSink>,
    policy: BookingPolicy,
}

impl BookingEngine {
    /// Creates an engine with the default policy and a sink that discards
    /// notifications.
    pub fn new() -> Self {
        Self::with(BookingPolicy::default(), Arc::new(NullSink))
    }

    pub fn with(policy: BookingPolicy, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            sessions: DashMap::new(),
            grants: DashMap::new(),
            user_grants: DashMap::new(),
            reservations: DashMap::new(),
            waitlists: DashMap::new(),
            entry_sessions: DashMap::new(),
            book: ReservationBook::new(),
            notifier,
            policy,
        }
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    // === Registration (catalogs feed the engine; creation is external) ===

    /// Registers a session produced by the class schedule catalog.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Validation`] for a zero capacity or a start time
    ///   not before the end time.
    /// - [`BookingError::DuplicateSession`] if the ID is already registered.
    pub fn add_session(&self, session: Session) -> Result<(), BookingError> {
        if session.capacity() == 0 {
            return Err(BookingError::Validation(
                "session capacity must be positive".to_string(),
            ));
        }
        let snapshot = session.snapshot();
        if snapshot.end_time <= snapshot.start_time {
            return Err(BookingError::Validation(
                "session must end after it starts".to_string(),
            ));
        }

        let id = session.id();
        match self.sessions.entry(id) {
            Entry::Occupied(_) => Err(BookingError::DuplicateSession),
            Entry::Vacant(entry) => {
                entry.insert(session);
                self.waitlists.insert(id, Waitlist::new(id));
                debug!(session = %id, "session registered");
                Ok(())
            }
        }
    }

    /// Registers a credit grant produced by the package catalog.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Validation`] for a zero credit total.
    /// - [`BookingError::DuplicateGrant`] if the ID is already registered.
    pub fn add_grant(&self, grant: CreditGrant) -> Result<(), BookingError> {
        if grant.total() == 0 {
            return Err(BookingError::Validation(
                "grant must carry at least one class credit".to_string(),
            ));
        }

        let id = grant.id();
        let user_id = grant.user_id();
        match self.grants.entry(id) {
            Entry::Occupied(_) => Err(BookingError::DuplicateGrant),
            Entry::Vacant(entry) => {
                entry.insert(grant);
                self.user_grants.entry(user_id).or_default().push(id);
                debug!(grant = %id, user = %user_id, "credit grant registered");
                Ok(())
            }
        }
    }

    /// The user's qualifying grant at `now`: consumable, soonest expiry
    /// first so credits closest to lapsing are spent before they are wasted.
    fn find_qualifying_grant(&self, user_id: UserId, now: DateTime<Utc>) -> Option<GrantId> {
        let grant_ids = self.user_grants.get(&user_id)?.clone();
        grant_ids
            .into_iter()
            .filter_map(|id| {
                let grant = self.grants.get(&id)?;
                grant.can_consume(now).then(|| (grant.expiry_date(), id))
            })
            .min_by_key(|(expiry, _)| *expiry)
            .map(|(_, id)| id)
    }

    // === Booking ===

    /// Books a seat for `user_id` in `session_id`, or waitlists the user if
    /// the session is full.
    ///
    /// # Errors
    ///
    /// - [`BookingError::SessionNotFound`] for an unknown session.
    /// - [`BookingError::NoActiveCredit`] if no grant qualifies at `now`.
    /// - [`BookingError::DuplicateReservation`] if the user already holds a
    ///   live reservation for this session.
    /// - [`BookingError::SessionNotBookable`] /
    ///   [`BookingError::OutsideBookingWindow`] from the capacity tracker.
    /// - [`BookingError::AlreadyWaitlisted`] when the session is full and
    ///   the user is already queued.
    /// - [`BookingError::CreditExhausted`] if the selected grant lost its
    ///   last credit to a concurrent booking and no other grant qualifies;
    ///   [`BookingError::ConcurrencyConflict`] if one does (retry wins).
    pub fn create_reservation(
        &self,
        user_id: UserId,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> Result<BookingOutcome, BookingError> {
        if !self.sessions.contains_key(&session_id) {
            return Err(BookingError::SessionNotFound);
        }

        let grant_id = self
            .find_qualifying_grant(user_id, now)
            .ok_or(BookingError::NoActiveCredit)?;

        // Claim the (user, session) pair before touching counters so a
        // duplicate request never gets as far as the seat.
        let reservation_id = ReservationId::new();
        self.book.claim(user_id, session_id, reservation_id)?;

        let seat = {
            let session = match self.sessions.get(&session_id) {
                Some(session) => session,
                None => {
                    self.book.release(user_id, session_id);
                    return Err(BookingError::SessionNotFound);
                }
            };
            session.reserve_seat(now, self.policy.booking_window)
        };

        match seat {
            Err(BookingError::SessionFull) => {
                // Deliberate policy, not a failure: redirect to the waitlist.
                self.book.release(user_id, session_id);
                return self.waitlist_user(user_id, session_id, now);
            }
            Err(err) => {
                self.book.release(user_id, session_id);
                return Err(err);
            }
            Ok(()) => {}
        }

        if let Err(err) = self.debit_grant(grant_id, now) {
            // Seat first, credit second: compensate the seat and report the
            // lost debit race.
            let rollback = self
                .sessions
                .get(&session_id)
                .map(|session| session.release_seat());
            debug_assert!(matches!(rollback, Some(Ok(()))));
            self.book.release(user_id, session_id);

            return if self.find_qualifying_grant(user_id, now).is_some() {
                // Another grant qualifies; a bounded retry will pick it up.
                Err(BookingError::ConcurrencyConflict)
            } else {
                Err(err)
            };
        }

        let reservation = Reservation::new(reservation_id, user_id, session_id, grant_id, now);
        let snapshot = reservation.snapshot();
        self.reservations.insert(reservation_id, reservation);
        self.book.commit(reservation_id);

        // An active waitlist entry is settled by the booking that seats its
        // owner, whether they were promoted or grabbed a freed seat directly.
        if let Some(waitlist) = self.waitlists.get(&session_id) {
            if let Some(entry) = waitlist.active_entry_for(user_id) {
                if waitlist.mark_enrolled(entry.id, now).is_ok() {
                    debug!(user = %user_id, session = %session_id, "waitlist entry enrolled");
                }
            }
        }

        info!(
            user = %user_id,
            session = %session_id,
            grant = %grant_id,
            reservation = %reservation_id,
            "reservation confirmed"
        );
        self.notifier.notify(
            user_id,
            NotificationKind::Booked,
            RelatedEntity::Reservation(reservation_id),
        );
        Ok(BookingOutcome::Confirmed(snapshot))
    }

    /// Books with bounded retries on lost counter races.
    pub fn create_reservation_with_retry(
        &self,
        user_id: UserId,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> Result<BookingOutcome, BookingError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.create_reservation(user_id, session_id, now) {
                Err(err) if err.is_retryable() && attempt < self.policy.max_booking_attempts => {
                    debug!(user = %user_id, session = %session_id, attempt, "retrying after conflict");
                }
                result => return result,
            }
        }
    }

    fn debit_grant(&self, grant_id: GrantId, now: DateTime<Utc>) -> Result<(), BookingError> {
        let grant = self.grants.get(&grant_id).ok_or(BookingError::GrantNotFound)?;
        grant.debit(now)
    }

    fn waitlist_user(
        &self,
        user_id: UserId,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> Result<BookingOutcome, BookingError> {
        let entry = {
            let waitlist = self
                .waitlists
                .get(&session_id)
                .ok_or(BookingError::SessionNotFound)?;
            waitlist.enqueue(user_id, now)?
        };
        self.entry_sessions.insert(entry.id, session_id);

        info!(
            user = %user_id,
            session = %session_id,
            position = entry.position,
            "session full, user waitlisted"
        );
        self.notifier.notify(
            user_id,
            NotificationKind::Waitlisted,
            RelatedEntity::WaitlistEntry(entry.id),
        );
        Ok(BookingOutcome::Waitlisted {
            entry_id: entry.id,
            position: entry.position,
        })
    }

    // === Cancellation ===

    /// Cancels a confirmed reservation: refunds the debited credit, frees
    /// the seat, and promotes the head of the waitlist.
    ///
    /// # Errors
    ///
    /// - [`BookingError::ReservationNotFound`] for an unknown ID.
    /// - [`BookingError::Validation`] if `actor` does not own it.
    /// - [`BookingError::AlreadyCancelled`] on a second cancellation.
    /// - [`BookingError::CancellationWindowPassed`] inside the window.
    /// - [`BookingError::InvalidTransition`] from attended/no-show.
    pub fn cancel_reservation(
        &self,
        reservation_id: ReservationId,
        actor: UserId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ReservationSnapshot, BookingError> {
        let (user_id, session_id, grant_id) = {
            let reservation = self
                .reservations
                .get(&reservation_id)
                .ok_or(BookingError::ReservationNotFound)?;
            (
                reservation.user_id(),
                reservation.session_id(),
                reservation.grant_id(),
            )
        };

        if actor != user_id {
            return Err(BookingError::Validation(
                "reservation belongs to a different user".to_string(),
            ));
        }

        let session_start = self
            .sessions
            .get(&session_id)
            .ok_or(BookingError::SessionNotFound)?
            .start_time();

        // Transition under the exclusive reference: whoever commits it owns
        // the refund and the seat release, so they happen exactly once.
        let snapshot = {
            let mut reservation = self
                .reservations
                .get_mut(&reservation_id)
                .ok_or(BookingError::ReservationNotFound)?;

            if reservation.status() == ReservationStatus::Confirmed
                && !self.policy.can_cancel(session_start, now)
            {
                return Err(BookingError::CancellationWindowPassed);
            }
            reservation.cancel(now, reason)?;
            reservation.snapshot()
        };

        // The reservation debited this grant exactly once and held exactly
        // one seat, so neither compensation can fail.
        if let Some(grant) = self.grants.get(&grant_id) {
            let refunded = grant.refund();
            debug_assert!(refunded.is_ok());
            if let Err(err) = refunded {
                warn!(grant = %grant_id, %err, "refund skipped on cancellation");
            }
        }
        if let Some(session) = self.sessions.get(&session_id) {
            let released = session.release_seat();
            debug_assert!(released.is_ok());
            if let Err(err) = released {
                warn!(session = %session_id, %err, "seat release skipped on cancellation");
            }
        }
        self.book.release(user_id, session_id);

        info!(
            user = %user_id,
            session = %session_id,
            reservation = %reservation_id,
            "reservation cancelled"
        );
        self.promote_next(session_id, now);
        self.notifier.notify(
            user_id,
            NotificationKind::Cancelled,
            RelatedEntity::Reservation(reservation_id),
        );
        Ok(snapshot)
    }

    /// Notifies the head of the session's waitlist that a seat opened up.
    ///
    /// Advisory only: no seat is held for the promoted user, and their
    /// follow-up booking re-validates capacity at call time.
    fn promote_next(&self, session_id: SessionId, now: DateTime<Utc>) -> Option<WaitlistEntry> {
        let promoted = self.waitlists.get(&session_id)?.promote_next(now)?;
        info!(
            user = %promoted.user_id,
            session = %session_id,
            "waitlist entry promoted"
        );
        self.notifier.notify(
            promoted.user_id,
            NotificationKind::SeatAvailable,
            RelatedEntity::WaitlistEntry(promoted.id),
        );
        Some(promoted)
    }

    // === Attendance ===

    /// Marks a confirmed reservation attended. Historical record only: no
    /// capacity or credit side effects.
    pub fn mark_attended(
        &self,
        reservation_id: ReservationId,
        now: DateTime<Utc>,
    ) -> Result<ReservationSnapshot, BookingError> {
        let mut reservation = self
            .reservations
            .get_mut(&reservation_id)
            .ok_or(BookingError::ReservationNotFound)?;
        reservation.mark_attended(now)?;
        Ok(reservation.snapshot())
    }

    /// Marks a confirmed reservation a no-show. The (user, session) claim is
    /// released: a no-show is no longer a live holder of the pair.
    pub fn mark_no_show(
        &self,
        reservation_id: ReservationId,
        now: DateTime<Utc>,
    ) -> Result<ReservationSnapshot, BookingError> {
        let snapshot = {
            let mut reservation = self
                .reservations
                .get_mut(&reservation_id)
                .ok_or(BookingError::ReservationNotFound)?;
            reservation.mark_no_show(now)?;
            reservation.snapshot()
        };
        self.book.release(snapshot.user_id, snapshot.session_id);
        Ok(snapshot)
    }

    // === Waitlist ===

    /// Cancels a waitlist entry owned by `actor`.
    pub fn remove_from_waitlist(
        &self,
        entry_id: EntryId,
        actor: UserId,
    ) -> Result<WaitlistEntry, BookingError> {
        let session_id = *self
            .entry_sessions
            .get(&entry_id)
            .ok_or(BookingError::WaitlistEntryNotFound)?;
        let waitlist = self
            .waitlists
            .get(&session_id)
            .ok_or(BookingError::WaitlistEntryNotFound)?;
        waitlist.remove(entry_id, actor)
    }

    // === Session lifecycle (studio-initiated) ===

    /// Cancels a session outright: every confirmed reservation is cancelled
    /// with a refund (the cancellation window does not apply to the studio),
    /// the waitlist is cleared, and everyone affected is notified. The
    /// caller is assumed to be authorized.
    pub fn cancel_session(
        &self,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> Result<SessionSnapshot, BookingError> {
        {
            let session = self
                .sessions
                .get(&session_id)
                .ok_or(BookingError::SessionNotFound)?;
            session.cancel()?;
        }

        // Collect first: transitioning entries while iterating the map
        // would deadlock on the shard.
        let affected: Vec<ReservationId> = self
            .reservations
            .iter()
            .filter(|r| {
                r.session_id() == session_id && r.status() == ReservationStatus::Confirmed
            })
            .map(|r| r.id())
            .collect();

        for reservation_id in affected {
            let cancelled = {
                let mut reservation = match self.reservations.get_mut(&reservation_id) {
                    Some(reservation) => reservation,
                    None => continue,
                };
                reservation
                    .cancel(now, Some("session cancelled by studio".to_string()))
                    .is_ok()
                    .then(|| (reservation.user_id(), reservation.grant_id()))
            };
            let Some((user_id, grant_id)) = cancelled else {
                continue;
            };

            if let Some(grant) = self.grants.get(&grant_id) {
                let refunded = grant.refund();
                debug_assert!(refunded.is_ok());
            }
            if let Some(session) = self.sessions.get(&session_id) {
                let released = session.release_seat();
                debug_assert!(released.is_ok());
            }
            self.book.release(user_id, session_id);
            self.notifier.notify(
                user_id,
                NotificationKind::SessionCancelled,
                RelatedEntity::Session(session_id),
            );
        }

        if let Some(waitlist) = self.waitlists.get(&session_id) {
            for entry in waitlist.cancel_active_entries() {
                self.notifier.notify(
                    entry.user_id,
                    NotificationKind::SessionCancelled,
                    RelatedEntity::Session(session_id),
                );
            }
        }

        info!(session = %session_id, "session cancelled by studio");
        self.sessions
            .get(&session_id)
            .map(|session| session.snapshot())
            .ok_or(BookingError::SessionNotFound)
    }

    // === Read surface ===

    pub fn session(&self, session_id: SessionId) -> Option<SessionSnapshot> {
        self.sessions.get(&session_id).map(|s| s.snapshot())
    }

    /// All registered sessions ordered by start time.
    pub fn sessions(&self) -> Vec<SessionSnapshot> {
        let mut sessions: Vec<SessionSnapshot> =
            self.sessions.iter().map(|s| s.snapshot()).collect();
        sessions.sort_by_key(|s| s.start_time);
        sessions
    }

    pub fn grant(&self, grant_id: GrantId, now: DateTime<Utc>) -> Option<GrantSnapshot> {
        self.grants.get(&grant_id).map(|g| g.snapshot(now))
    }

    /// Every registered grant, in no particular order.
    pub fn all_grants(&self, now: DateTime<Utc>) -> Vec<GrantSnapshot> {
        self.grants.iter().map(|g| g.snapshot(now)).collect()
    }

    /// The user's grants ordered by expiry, soonest first.
    pub fn user_grants(&self, user_id: UserId, now: DateTime<Utc>) -> Vec<GrantSnapshot> {
        let Some(grant_ids) = self.user_grants.get(&user_id).map(|ids| ids.clone()) else {
            return Vec::new();
        };
        let mut grants: Vec<GrantSnapshot> = grant_ids
            .into_iter()
            .filter_map(|id| self.grants.get(&id).map(|g| g.snapshot(now)))
            .collect();
        grants.sort_by_key(|g| g.expiry_date);
        grants
    }

    pub fn reservation(&self, reservation_id: ReservationId) -> Option<ReservationSnapshot> {
        self.reservations.get(&reservation_id).map(|r| r.snapshot())
    }

    /// The user's reservations ordered by booking time.
    pub fn user_reservations(&self, user_id: UserId) -> Vec<ReservationSnapshot> {
        let mut reservations: Vec<ReservationSnapshot> = self
            .reservations
            .iter()
            .filter(|r| r.user_id() == user_id)
            .map(|r| r.snapshot())
            .collect();
        reservations.sort_by_key(|r| r.reserved_at);
        reservations
    }

    /// The session's waitlist in enqueue order, settled entries included.
    pub fn session_waitlist(&self, session_id: SessionId) -> Vec<WaitlistEntry> {
        self.waitlists
            .get(&session_id)
            .map(|w| w.entries())
            .unwrap_or_default()
    }

    /// Drains the FIFO commit log of reservation IDs, in creation order.
    pub fn drain_booking_log(&self) -> Vec<ReservationId> {
        self.book.drain_committed()
    }
}

impl Default for BookingEngine {
    fn default() -> Self {
        Self::new()
    }
}
