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

//! Error types for booking and credit-ledger operations.

use thiserror::Error;

/// Booking and ledger processing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// Malformed or inconsistent input, the caller's fault
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced session does not exist
    #[error("session not found")]
    SessionNotFound,

    /// Referenced credit grant does not exist
    #[error("credit grant not found")]
    GrantNotFound,

    /// Referenced reservation does not exist
    #[error("reservation not found")]
    ReservationNotFound,

    /// Referenced waitlist entry does not exist
    #[error("waitlist entry not found")]
    WaitlistEntryNotFound,

    /// User has no active grant with credits remaining
    #[error("no active credit grant with classes remaining")]
    NoActiveCredit,

    /// Grant cannot be debited (expired, exhausted, or cancelled)
    #[error("credit grant cannot be debited")]
    CreditExhausted,

    /// Refund would push the grant's used count negative
    #[error("nothing to refund on this grant")]
    NothingToRefund,

    /// Session has no seats left; converted into a waitlist outcome by the
    /// engine and never surfaced from `create_reservation`
    #[error("session is full")]
    SessionFull,

    /// Session is cancelled, completed, or already started
    #[error("session is not open for booking")]
    SessionNotBookable,

    /// Session starts beyond the allowed booking lead time
    #[error("session is outside the booking window")]
    OutsideBookingWindow,

    /// A confirmed or attended reservation already exists for this user and
    /// session
    #[error("user already holds a reservation for this session")]
    DuplicateReservation,

    /// A session with this ID is already registered
    #[error("duplicate session ID")]
    DuplicateSession,

    /// A grant with this ID is already registered
    #[error("duplicate grant ID")]
    DuplicateGrant,

    /// Reservation is already cancelled
    #[error("reservation is already cancelled")]
    AlreadyCancelled,

    /// User already holds a waiting or notified waitlist entry for this
    /// session
    #[error("user is already on the waitlist")]
    AlreadyWaitlisted,

    /// Cancellation attempted inside the cancellation window
    #[error("too late to cancel this reservation")]
    CancellationWindowPassed,

    /// Seat release on a session with no confirmed occupants
    #[error("no confirmed seat to release")]
    NothingToRelease,

    /// State machine rejected the transition
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Lost a race for a scarce counter; safe to retry a bounded number of
    /// times
    #[error("concurrent update conflict, retry the operation")]
    ConcurrencyConflict,
}

impl BookingError {
    /// True for errors caused by losing a race, where a bounded retry is
    /// expected to succeed. All other errors are terminal for the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::ConcurrencyConflict)
    }
}
