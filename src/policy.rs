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

//! Time-window policies governing booking and cancellation.
//!
//! The cancellation rule is a pure predicate over `(session start, now)`;
//! the booking window is a lead-time bound the capacity tracker enforces.
//! The policy holds no mutable state and can be shared freely.

use chrono::{DateTime, Duration, Utc};

/// Tunable business rules for the booking engine.
///
/// Defaults: reservations may be placed up to 7 days ahead of the session
/// start, and cancelled without penalty up to 8 hours before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingPolicy {
    /// Minimum lead time before session start required to cancel.
    pub cancellation_window: Duration,
    /// Maximum lead time ahead of session start allowed for booking.
    pub booking_window: Duration,
    /// Bound on retries after a lost counter race.
    pub max_booking_attempts: u32,
}

impl BookingPolicy {
    pub fn new(cancellation_window: Duration, booking_window: Duration) -> Self {
        Self {
            cancellation_window,
            booking_window,
            max_booking_attempts: 3,
        }
    }

    /// True iff a reservation for a session starting at `session_start` may
    /// still be cancelled at `now`: `now <= session_start - window`.
    pub fn can_cancel(&self, session_start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now <= session_start - self.cancellation_window
    }
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self::new(Duration::hours(8), Duration::days(7))
    }
}
