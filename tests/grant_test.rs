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

//! Credit grant public API integration tests.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::thread;
use studio_booking_rs::{BookingError, CreditGrant, GrantId, GrantStatus, UserId};

// === Helper Functions ===

fn make_grant(total: u32, now: DateTime<Utc>) -> CreditGrant {
    CreditGrant::new(GrantId(1), UserId(7), total, now, now + Duration::days(30))
}

#[test]
fn fresh_grant_is_fully_available() {
    let now = Utc::now();
    let grant = make_grant(10, now);

    assert_eq!(grant.total(), 10);
    assert_eq!(grant.used(), 0);
    assert_eq!(grant.remaining(), 10);
    assert_eq!(grant.status(now), GrantStatus::Active);
    assert!(grant.can_consume(now));
}

#[test]
fn debit_and_refund_round_trip() {
    let now = Utc::now();
    let grant = make_grant(10, now);

    grant.debit(now).unwrap();
    grant.debit(now).unwrap();
    assert_eq!(grant.remaining(), 8);
    assert_eq!(grant.used(), 2);

    grant.refund().unwrap();
    assert_eq!(grant.remaining(), 9);
    assert_eq!(grant.used(), 1);
}

#[test]
fn last_credit_flips_status_to_exhausted() {
    let now = Utc::now();
    let grant = make_grant(1, now);

    grant.debit(now).unwrap();
    assert_eq!(grant.status(now), GrantStatus::Exhausted);
    assert!(!grant.can_consume(now));

    // A refund restores it to active.
    grant.refund().unwrap();
    assert_eq!(grant.status(now), GrantStatus::Active);
}

#[test]
fn expiry_is_resolved_at_read_time() {
    let now = Utc::now();
    let grant = make_grant(10, now);

    assert_eq!(grant.status(now), GrantStatus::Active);
    assert_eq!(
        grant.status(now + Duration::days(31)),
        GrantStatus::Expired
    );
    // Same grant, earlier clock: still active. Nothing was stored.
    assert_eq!(grant.status(now), GrantStatus::Active);
}

#[test]
fn expired_grant_rejects_debit_but_accepts_refund() {
    let now = Utc::now();
    let grant = make_grant(10, now);
    grant.debit(now).unwrap();

    let later = now + Duration::days(40);
    assert_eq!(grant.debit(later), Err(BookingError::CreditExhausted));
    // Cancelling a class after the grant lapsed still returns the credit.
    grant.refund().unwrap();
    assert_eq!(grant.remaining(), 10);
}

#[test]
fn refund_on_untouched_grant_fails() {
    let now = Utc::now();
    let grant = make_grant(10, now);
    assert_eq!(grant.refund(), Err(BookingError::NothingToRefund));
}

#[test]
fn cancelled_grant_is_terminal() {
    let now = Utc::now();
    let grant = make_grant(10, now);
    grant.cancel();

    assert_eq!(grant.status(now), GrantStatus::Cancelled);
    assert_eq!(grant.debit(now), Err(BookingError::CreditExhausted));
    // Even far in the future the stored override wins.
    assert_eq!(
        grant.status(now + Duration::days(365)),
        GrantStatus::Cancelled
    );
}

// === Concurrency ===

/// Many threads race to debit the same grant; exactly `total` debits can
/// ever succeed, no matter the interleaving.
#[test]
fn concurrent_debits_never_oversubscribe() {
    let now = Utc::now();
    let grant = Arc::new(make_grant(50, now));

    const NUM_THREADS: usize = 100;
    let mut handles = Vec::with_capacity(NUM_THREADS);

    for _ in 0..NUM_THREADS {
        let grant = grant.clone();
        handles.push(thread::spawn(move || grant.debit(now).is_ok()));
    }

    let successes = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .filter(|&ok| ok)
        .count();

    assert_eq!(successes, 50);
    assert_eq!(grant.remaining(), 0);
    assert_eq!(grant.used(), 50);
}

/// Interleaved debits and refunds keep the arithmetic exact.
#[test]
fn concurrent_debit_refund_mix_keeps_invariants() {
    let now = Utc::now();
    let grant = Arc::new(make_grant(30, now));

    let mut handles = Vec::new();
    for i in 0..60 {
        let grant = grant.clone();
        handles.push(thread::spawn(move || {
            if i % 2 == 0 {
                let _ = grant.debit(now);
            } else {
                let _ = grant.refund();
            }
        }));
    }

    for handle in handles {
        handle.join().expect("thread panicked");
    }

    assert_eq!(grant.remaining(), grant.total() - grant.used());
    assert!(grant.used() <= grant.total());
}
