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

//! Credit ledger: prepaid class-credit grants.
//!
//! A grant's status is never stored; it is resolved from `remaining` and the
//! expiry date on every access, so a grant that lapses overnight reads as
//! expired the next morning without any background job touching it.
//!
//! # Example
//!
//! ```
//! use chrono::{Duration, Utc};
//! use studio_booking_rs::{CreditGrant, GrantId, GrantStatus, UserId};
//!
//! let now = Utc::now();
//! let grant = CreditGrant::new(GrantId(1), UserId(7), 10, now, now + Duration::days(30));
//! assert_eq!(grant.remaining(), 10);
//! assert_eq!(grant.status(now), GrantStatus::Active);
//! ```

use crate::base::{GrantId, UserId};
use crate::error::BookingError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Resolved grant status.
///
/// `cancelled` is the only stored state and overrides everything else;
/// the rest derive from the expiry date and the remaining count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GrantStatus {
    Active,
    Expired,
    Exhausted,
    Cancelled,
}

impl GrantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantStatus::Active => "active",
            GrantStatus::Expired => "expired",
            GrantStatus::Exhausted => "exhausted",
            GrantStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug)]
struct GrantData {
    id: GrantId,
    user_id: UserId,
    total: u32,
    used: u32,
    remaining: u32,
    purchase_date: DateTime<Utc>,
    expiry_date: DateTime<Utc>,
    cancelled: bool,
}

impl GrantData {
    fn new(
        id: GrantId,
        user_id: UserId,
        total: u32,
        purchase_date: DateTime<Utc>,
        expiry_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            total,
            used: 0,
            remaining: total,
            purchase_date,
            expiry_date,
            cancelled: false,
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.used <= self.total,
            "Invariant violated: used {} exceeds total {}",
            self.used,
            self.total
        );
        debug_assert_eq!(
            self.remaining,
            self.total - self.used,
            "Invariant violated: remaining {} != total {} - used {}",
            self.remaining,
            self.total,
            self.used
        );
    }

    /// Recomputed on every read and write, never stored.
    fn status(&self, now: DateTime<Utc>) -> GrantStatus {
        if self.cancelled {
            GrantStatus::Cancelled
        } else if now > self.expiry_date {
            GrantStatus::Expired
        } else if self.remaining == 0 {
            GrantStatus::Exhausted
        } else {
            GrantStatus::Active
        }
    }

    fn can_consume(&self, now: DateTime<Utc>) -> bool {
        self.status(now) == GrantStatus::Active && self.remaining > 0
    }

    /// Consumes one class credit.
    fn debit(&mut self, now: DateTime<Utc>) -> Result<(), BookingError> {
        if !self.can_consume(now) {
            return Err(BookingError::CreditExhausted);
        }
        self.used += 1;
        self.remaining -= 1;
        self.assert_invariants();
        Ok(())
    }

    /// Returns one class credit.
    ///
    /// Refunds are allowed on expired grants: cancelling a class does not
    /// forfeit the credit that paid for it.
    fn refund(&mut self) -> Result<(), BookingError> {
        if self.used == 0 {
            return Err(BookingError::NothingToRefund);
        }
        self.used -= 1;
        self.remaining += 1;
        self.assert_invariants();
        Ok(())
    }
}

/// A user's prepaid block of class credits.
#[derive(Debug)]
pub struct CreditGrant {
    inner: Mutex<GrantData>,
}

impl CreditGrant {
    pub fn new(
        id: GrantId,
        user_id: UserId,
        total: u32,
        purchase_date: DateTime<Utc>,
        expiry_date: DateTime<Utc>,
    ) -> Self {
        Self {
            inner: Mutex::new(GrantData::new(id, user_id, total, purchase_date, expiry_date)),
        }
    }

    pub fn id(&self) -> GrantId {
        self.inner.lock().id
    }

    pub fn user_id(&self) -> UserId {
        self.inner.lock().user_id
    }

    pub fn total(&self) -> u32 {
        self.inner.lock().total
    }

    pub fn used(&self) -> u32 {
        self.inner.lock().used
    }

    pub fn remaining(&self) -> u32 {
        self.inner.lock().remaining
    }

    pub fn expiry_date(&self) -> DateTime<Utc> {
        self.inner.lock().expiry_date
    }

    pub fn status(&self, now: DateTime<Utc>) -> GrantStatus {
        self.inner.lock().status(now)
    }

    /// True iff the grant is active at `now` and has credits left.
    pub fn can_consume(&self, now: DateTime<Utc>) -> bool {
        self.inner.lock().can_consume(now)
    }

    /// Atomically checks and consumes one credit.
    ///
    /// # Errors
    ///
    /// [`BookingError::CreditExhausted`] if the grant is expired, exhausted,
    /// or cancelled at `now`.
    pub fn debit(&self, now: DateTime<Utc>) -> Result<(), BookingError> {
        self.inner.lock().debit(now)
    }

    /// Atomically returns one credit.
    ///
    /// # Errors
    ///
    /// [`BookingError::NothingToRefund`] if no credit has been used; a
    /// refund can never push `remaining` above `total`.
    pub fn refund(&self) -> Result<(), BookingError> {
        self.inner.lock().refund()
    }

    /// Administrative revocation. Terminal: overrides the derived status.
    pub fn cancel(&self) {
        self.inner.lock().cancelled = true;
    }

    /// Point-in-time view with the status resolved at `now`.
    pub fn snapshot(&self, now: DateTime<Utc>) -> GrantSnapshot {
        let data = self.inner.lock();
        GrantSnapshot {
            id: data.id,
            user_id: data.user_id,
            total: data.total,
            used: data.used,
            remaining: data.remaining,
            purchase_date: data.purchase_date,
            expiry_date: data.expiry_date,
            status: data.status(now),
        }
    }
}

/// Serializable point-in-time view of a [`CreditGrant`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GrantSnapshot {
    pub id: GrantId,
    pub user_id: UserId,
    pub total: u32,
    pub used: u32,
    pub remaining: u32,
    pub purchase_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub status: GrantStatus,
}
