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

//! Session capacity tracking.
//!
//! Seat accounting for one scheduled class occurrence. The check-and-increment
//! on the confirmed count runs under the session's own lock, so two callers
//! racing for the last seat serialize there and exactly one wins.

use crate::base::{SessionId, UserId};
use crate::error::BookingError;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Session lifecycle status. Sessions are never deleted, only cancelled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Scheduled,
    Cancelled,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Completed => "completed",
        }
    }
}

#[derive(Debug)]
struct SessionData {
    id: SessionId,
    class_name: String,
    instructor: UserId,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    capacity: u32,
    confirmed_count: u32,
    status: SessionStatus,
}

impl SessionData {
    fn assert_invariants(&self) {
        debug_assert!(
            self.confirmed_count <= self.capacity,
            "Invariant violated: confirmed count {} exceeds capacity {}",
            self.confirmed_count,
            self.capacity
        );
    }

    fn available_seats(&self) -> u32 {
        self.capacity.saturating_sub(self.confirmed_count)
    }

    /// Atomic check-and-increment of the confirmed count.
    fn reserve_seat(
        &mut self,
        now: DateTime<Utc>,
        booking_window: Duration,
    ) -> Result<(), BookingError> {
        if self.status != SessionStatus::Scheduled || self.start_time <= now {
            return Err(BookingError::SessionNotBookable);
        }
        if self.start_time > now + booking_window {
            return Err(BookingError::OutsideBookingWindow);
        }
        if self.available_seats() == 0 {
            return Err(BookingError::SessionFull);
        }
        self.confirmed_count += 1;
        self.assert_invariants();
        Ok(())
    }

    fn release_seat(&mut self) -> Result<(), BookingError> {
        if self.confirmed_count == 0 {
            return Err(BookingError::NothingToRelease);
        }
        self.confirmed_count -= 1;
        self.assert_invariants();
        Ok(())
    }

    fn transition(&mut self, to: SessionStatus) -> Result<(), BookingError> {
        if self.status != SessionStatus::Scheduled {
            return Err(BookingError::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        self.status = to;
        Ok(())
    }
}

/// One scheduled occurrence of a class with fixed seat capacity.
#[derive(Debug)]
pub struct Session {
    inner: Mutex<SessionData>,
}

impl Session {
    pub fn new(
        id: SessionId,
        class_name: impl Into<String>,
        instructor: UserId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        capacity: u32,
    ) -> Self {
        Self {
            inner: Mutex::new(SessionData {
                id,
                class_name: class_name.into(),
                instructor,
                start_time,
                end_time,
                capacity,
                confirmed_count: 0,
                status: SessionStatus::Scheduled,
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.lock().id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.inner.lock().start_time
    }

    pub fn capacity(&self) -> u32 {
        self.inner.lock().capacity
    }

    pub fn confirmed_count(&self) -> u32 {
        self.inner.lock().confirmed_count
    }

    /// `capacity - confirmed_count`, floored at zero.
    pub fn available_seats(&self) -> u32 {
        self.inner.lock().available_seats()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().status
    }

    /// Claims one seat if the session is bookable at `now`.
    ///
    /// # Errors
    ///
    /// - [`BookingError::SessionNotBookable`] if the session is cancelled,
    ///   completed, or already started.
    /// - [`BookingError::OutsideBookingWindow`] if the session starts beyond
    ///   `now + booking_window`.
    /// - [`BookingError::SessionFull`] if every seat is taken.
    pub fn reserve_seat(
        &self,
        now: DateTime<Utc>,
        booking_window: Duration,
    ) -> Result<(), BookingError> {
        self.inner.lock().reserve_seat(now, booking_window)
    }

    /// Frees one confirmed seat.
    ///
    /// # Errors
    ///
    /// [`BookingError::NothingToRelease`] if no seat is held.
    pub fn release_seat(&self) -> Result<(), BookingError> {
        self.inner.lock().release_seat()
    }

    /// Marks the session cancelled. Scheduled-only; terminal.
    pub fn cancel(&self) -> Result<(), BookingError> {
        self.inner.lock().transition(SessionStatus::Cancelled)
    }

    /// Marks the session completed. Scheduled-only; terminal.
    pub fn complete(&self) -> Result<(), BookingError> {
        self.inner.lock().transition(SessionStatus::Completed)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let data = self.inner.lock();
        SessionSnapshot {
            id: data.id,
            class_name: data.class_name.clone(),
            instructor: data.instructor,
            start_time: data.start_time,
            end_time: data.end_time,
            capacity: data.capacity,
            confirmed_count: data.confirmed_count,
            available_seats: data.available_seats(),
            status: data.status,
        }
    }
}

/// Serializable point-in-time view of a [`Session`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub class_name: String,
    pub instructor: UserId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub capacity: u32,
    pub confirmed_count: u32,
    pub available_seats: u32,
    pub status: SessionStatus,
}
