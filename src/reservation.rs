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

//! Reservation state machine.
//!
//! A reservation binds one user to one seat in one session, debited against
//! one credit grant. States:
//!
//! - `Confirmed` → `Cancelled` (via cancel)
//! - `Confirmed` → `Attended` or `NoShow` (via attendance marking)
//!
//! All three outcomes are terminal. Attendance marking is a historical
//! record only; it moves no seats and no credits.

use crate::base::{GrantId, ReservationId, SessionId, UserId};
use crate::error::BookingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Confirmed,
    Cancelled,
    Attended,
    NoShow,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Attended => "attended",
            ReservationStatus::NoShow => "no_show",
        }
    }
}

/// One user's claim on one seat, paid for with one credit.
#[derive(Debug, Clone)]
pub struct Reservation {
    id: ReservationId,
    user_id: UserId,
    session_id: SessionId,
    grant_id: GrantId,
    status: ReservationStatus,
    reserved_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    attendance_marked_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn new(
        id: ReservationId,
        user_id: UserId,
        session_id: SessionId,
        grant_id: GrantId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            session_id,
            grant_id,
            status: ReservationStatus::Confirmed,
            reserved_at: now,
            cancelled_at: None,
            cancellation_reason: None,
            attendance_marked_at: None,
        }
    }

    pub fn id(&self) -> ReservationId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// The grant this reservation was debited against; the cancellation
    /// refund goes back to exactly this grant.
    pub fn grant_id(&self) -> GrantId {
        self.grant_id
    }

    pub fn status(&self) -> ReservationStatus {
        self.status
    }

    /// Transitions to `Cancelled` and stamps time and reason.
    ///
    /// # Errors
    ///
    /// - [`BookingError::AlreadyCancelled`] if the reservation was cancelled
    ///   before (never a silent no-op, never a double refund).
    /// - [`BookingError::InvalidTransition`] from `Attended`/`NoShow`.
    pub fn cancel(
        &mut self,
        now: DateTime<Utc>,
        reason: Option<String>,
    ) -> Result<(), BookingError> {
        match self.status {
            ReservationStatus::Cancelled => Err(BookingError::AlreadyCancelled),
            ReservationStatus::Confirmed => {
                self.status = ReservationStatus::Cancelled;
                self.cancelled_at = Some(now);
                self.cancellation_reason = reason;
                Ok(())
            }
            _ => Err(self.invalid_transition(ReservationStatus::Cancelled)),
        }
    }

    /// Confirmed-only; terminal.
    pub fn mark_attended(&mut self, now: DateTime<Utc>) -> Result<(), BookingError> {
        self.mark_attendance(ReservationStatus::Attended, now)
    }

    /// Confirmed-only; terminal.
    pub fn mark_no_show(&mut self, now: DateTime<Utc>) -> Result<(), BookingError> {
        self.mark_attendance(ReservationStatus::NoShow, now)
    }

    fn mark_attendance(
        &mut self,
        to: ReservationStatus,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        if self.status != ReservationStatus::Confirmed {
            return Err(self.invalid_transition(to));
        }
        self.status = to;
        self.attendance_marked_at = Some(now);
        Ok(())
    }

    fn invalid_transition(&self, to: ReservationStatus) -> BookingError {
        BookingError::InvalidTransition {
            from: self.status.as_str().to_string(),
            to: to.as_str().to_string(),
        }
    }

    pub fn snapshot(&self) -> ReservationSnapshot {
        ReservationSnapshot {
            id: self.id,
            user_id: self.user_id,
            session_id: self.session_id,
            grant_id: self.grant_id,
            status: self.status,
            reserved_at: self.reserved_at,
            cancelled_at: self.cancelled_at,
            cancellation_reason: self.cancellation_reason.clone(),
            attendance_marked_at: self.attendance_marked_at,
        }
    }
}

/// Serializable point-in-time view of a [`Reservation`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReservationSnapshot {
    pub id: ReservationId,
    pub user_id: UserId,
    pub session_id: SessionId,
    pub grant_id: GrantId,
    pub status: ReservationStatus,
    pub reserved_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub attendance_marked_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_reservation(now: DateTime<Utc>) -> Reservation {
        Reservation::new(ReservationId::new(), UserId(1), SessionId(1), GrantId(1), now)
    }

    #[test]
    fn new_reservation_is_confirmed() {
        let now = Utc::now();
        let reservation = make_reservation(now);
        assert_eq!(reservation.status(), ReservationStatus::Confirmed);
        assert_eq!(reservation.snapshot().reserved_at, now);
    }

    #[test]
    fn cancel_stamps_time_and_reason() {
        let now = Utc::now();
        let mut reservation = make_reservation(now);
        let later = now + chrono::Duration::hours(1);

        reservation.cancel(later, Some("schedule conflict".into())).unwrap();

        let snap = reservation.snapshot();
        assert_eq!(snap.status, ReservationStatus::Cancelled);
        assert_eq!(snap.cancelled_at, Some(later));
        assert_eq!(snap.cancellation_reason.as_deref(), Some("schedule conflict"));
    }

    #[test]
    fn double_cancel_is_rejected() {
        let now = Utc::now();
        let mut reservation = make_reservation(now);
        reservation.cancel(now, None).unwrap();
        assert_eq!(reservation.cancel(now, None), Err(BookingError::AlreadyCancelled));
    }

    #[test]
    fn attendance_from_confirmed_only() {
        let now = Utc::now();
        let mut reservation = make_reservation(now);
        reservation.mark_attended(now).unwrap();
        assert_eq!(reservation.status(), ReservationStatus::Attended);

        // Terminal: no further transitions.
        let result = reservation.mark_no_show(now);
        assert_eq!(
            result,
            Err(BookingError::InvalidTransition {
                from: "attended".to_string(),
                to: "no_show".to_string()
            })
        );
        let result = reservation.cancel(now, None);
        assert_eq!(
            result,
            Err(BookingError::InvalidTransition {
                from: "attended".to_string(),
                to: "cancelled".to_string()
            })
        );
    }

    #[test]
    fn no_show_is_terminal() {
        let now = Utc::now();
        let mut reservation = make_reservation(now);
        reservation.mark_no_show(now).unwrap();
        assert_eq!(reservation.status(), ReservationStatus::NoShow);
        assert!(reservation.mark_attended(now).is_err());
    }

    #[test]
    fn cancelled_cannot_be_marked_attended() {
        let now = Utc::now();
        let mut reservation = make_reservation(now);
        reservation.cancel(now, None).unwrap();
        let result = reservation.mark_attended(now);
        assert_eq!(
            result,
            Err(BookingError::InvalidTransition {
                from: "cancelled".to_string(),
                to: "attended".to_string()
            })
        );
    }
}
