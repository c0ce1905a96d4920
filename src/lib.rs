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

//! # Studio Booking
//!
//! This library provides a booking and credit-ledger engine for studio
//! classes: seat capacity enforcement, prepaid class-credit debits and
//! refunds, cancellation windows, and waitlist promotion.
//!
//! ## Core Components
//!
//! - [`BookingEngine`]: Central orchestrator managing sessions, grants,
//!   reservations, and waitlists
//! - [`Session`]: A scheduled class occurrence with fixed seat capacity
//! - [`CreditGrant`]: A user's prepaid block of class credits with an expiry
//! - [`Reservation`]: The binding of one user to one seat, debited against
//!   one grant
//! - [`Waitlist`]: Ordered per-session queue for full sessions
//! - [`BookingError`]: Error types for booking and ledger failures
//!
//! ## Example
//!
//! ```
//! use chrono::{Duration, Utc};
//! use studio_booking_rs::{
//!     BookingEngine, BookingOutcome, CreditGrant, GrantId, Session, SessionId, UserId,
//! };
//!
//! let engine = BookingEngine::new();
//! let now = Utc::now();
//!
//! // The catalogs feed the engine a session and a credit grant.
//! engine
//!     .add_session(Session::new(
//!         SessionId(1),
//!         "Reformer Flow",
//!         UserId(100),
//!         now + Duration::hours(24),
//!         now + Duration::hours(25),
//!         10,
//!     ))
//!     .unwrap();
//! engine
//!     .add_grant(CreditGrant::new(
//!         GrantId(1),
//!         UserId(1),
//!         8,
//!         now,
//!         now + Duration::days(30),
//!     ))
//!     .unwrap();
//!
//! // Book a seat: one credit is debited, one seat claimed.
//! let outcome = engine.create_reservation(UserId(1), SessionId(1), now).unwrap();
//! assert!(matches!(outcome, BookingOutcome::Confirmed(_)));
//! assert_eq!(engine.grant(GrantId(1), now).unwrap().remaining, 7);
//! assert_eq!(engine.session(SessionId(1)).unwrap().available_seats, 9);
//! ```
//!
//! ## Thread Safety
//!
//! All engine operations take `&self` and are safe to call from many
//! threads. Seat and credit counters mutate under per-entity locks, so two
//! callers racing for the last seat of one session serialize there; the
//! loser of a full session lands on the waitlist.

pub mod base;
mod booking_log;
mod engine;
pub mod error;
pub mod grant;
mod notify;
mod policy;
mod reservation;
mod session;
mod waitlist;

pub use base::{EntryId, GrantId, ReservationId, SessionId, UserId};
pub use booking_log::ReservationBook;
pub use engine::{BookingEngine, BookingOutcome};
pub use error::BookingError;
pub use grant::{CreditGrant, GrantSnapshot, GrantStatus};
pub use notify::{
    MemorySink, Notification, NotificationKind, NotificationSink, NullSink, RelatedEntity,
};
pub use policy::BookingPolicy;
pub use reservation::{Reservation, ReservationSnapshot, ReservationStatus};
pub use session::{Session, SessionSnapshot, SessionStatus};
pub use waitlist::{Waitlist, WaitlistEntry, WaitlistStatus};
