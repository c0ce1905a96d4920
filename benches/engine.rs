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

//! Benchmarks for the booking engine.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Single-threaded booking and cancellation processing
//! - Multi-threaded concurrent bookings
//! - Waitlist churn (cancellation + promotion cycles)
//! - Contention on a single session versus spread across many

use chrono::{DateTime, Duration, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rayon::prelude::*;
use std::sync::Arc;
use studio_booking_rs::{
    BookingEngine, BookingOutcome, CreditGrant, GrantId, Session, SessionId, UserId,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn make_session(id: u32, capacity: u32, now: DateTime<Utc>) -> Session {
    Session::new(
        SessionId(id),
        "Reformer Flow",
        UserId(9000),
        now + Duration::hours(24),
        now + Duration::hours(25),
        capacity,
    )
}

fn make_grant(id: u32, user: u32, total: u32, now: DateTime<Utc>) -> CreditGrant {
    CreditGrant::new(GrantId(id), UserId(user), total, now, now + Duration::days(30))
}

/// Engine with `users` grant holders and `sessions` roomy sessions.
fn seeded_engine(sessions: u32, capacity: u32, users: u32, now: DateTime<Utc>) -> BookingEngine {
    let engine = BookingEngine::new();
    for id in 1..=sessions {
        engine.add_session(make_session(id, capacity, now)).unwrap();
    }
    for user in 1..=users {
        engine.add_grant(make_grant(user, user, 1000, now)).unwrap();
    }
    engine
}

// =============================================================================
// Single-Threaded Benchmarks
// =============================================================================

fn bench_single_booking(c: &mut Criterion) {
    c.bench_function("single_booking", |b| {
        let now = Utc::now();
        b.iter(|| {
            let engine = seeded_engine(1, 10, 1, now);
            engine
                .create_reservation(black_box(UserId(1)), SessionId(1), now)
                .unwrap();
        })
    });
}

fn bench_booking_cancellation_pair(c: &mut Criterion) {
    c.bench_function("booking_cancellation_pair", |b| {
        let now = Utc::now();
        b.iter(|| {
            let engine = seeded_engine(1, 10, 1, now);
            let outcome = engine.create_reservation(UserId(1), SessionId(1), now).unwrap();
            let BookingOutcome::Confirmed(snapshot) = outcome else {
                unreachable!("seat was free");
            };
            engine
                .cancel_reservation(black_box(snapshot.id), UserId(1), None, now)
                .unwrap();
        })
    });
}

fn bench_booking_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("booking_throughput");

    for count in [100u32, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let now = Utc::now();
            b.iter(|| {
                // Sessions sized so every booking confirms.
                let engine = seeded_engine(count / 100 + 1, 100, count, now);
                for user in 1..=count {
                    let session = SessionId(user % (count / 100 + 1) + 1);
                    engine.create_reservation(UserId(user), session, now).unwrap();
                }
                black_box(&engine);
            })
        });
    }
    group.finish();
}

// =============================================================================
// Waitlist Benchmarks
// =============================================================================

fn bench_waitlist_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("waitlist_churn");

    // One full session; each iteration cancels the head booking which
    // promotes a waiting user, then the promoted user books the seat.
    group.bench_function("cancel_promote_rebook", |b| {
        let now = Utc::now();
        b.iter(|| {
            let engine = seeded_engine(1, 1, 3, now);
            let BookingOutcome::Confirmed(first) =
                engine.create_reservation(UserId(1), SessionId(1), now).unwrap()
            else {
                unreachable!("seat was free");
            };
            // Users 2 and 3 queue up.
            engine.create_reservation(UserId(2), SessionId(1), now).unwrap();
            engine.create_reservation(UserId(3), SessionId(1), now).unwrap();

            // Cancel → promote user 2 → user 2 takes the seat.
            engine.cancel_reservation(first.id, UserId(1), None, now).unwrap();
            engine.create_reservation(UserId(2), SessionId(1), now).unwrap();
            black_box(&engine);
        })
    });
    group.finish();
}

// =============================================================================
// Multi-Threaded Benchmarks
// =============================================================================

fn bench_parallel_bookings_one_session(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_bookings_one_session");

    for users in [100u32, 1_000].iter() {
        group.throughput(Throughput::Elements(*users as u64));
        group.bench_with_input(BenchmarkId::from_parameter(users), users, |b, &users| {
            let now = Utc::now();
            b.iter(|| {
                // Half the users fit; the rest hammer the waitlist.
                let engine = Arc::new(seeded_engine(1, users / 2, users, now));

                (1..=users).into_par_iter().for_each(|user| {
                    let _ = engine.create_reservation(UserId(user), SessionId(1), now);
                });

                black_box(&engine);
            })
        });
    }
    group.finish();
}

fn bench_parallel_bookings_spread_sessions(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_bookings_spread_sessions");

    for users in [100u32, 1_000].iter() {
        group.throughput(Throughput::Elements(*users as u64));
        group.bench_with_input(BenchmarkId::from_parameter(users), users, |b, &users| {
            let now = Utc::now();
            b.iter(|| {
                let sessions = 16u32;
                let engine = Arc::new(seeded_engine(sessions, users, users, now));

                (1..=users).into_par_iter().for_each(|user| {
                    let session = SessionId(user % sessions + 1);
                    let _ = engine.create_reservation(UserId(user), session, now);
                });

                black_box(&engine);
            })
        });
    }
    group.finish();
}

fn bench_contention_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("contention");

    // Same workload, different numbers of sessions sharing it: one session
    // means every booking serializes on the same counter.
    for sessions in [1u32, 4, 16].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(sessions),
            sessions,
            |b, &sessions| {
                let now = Utc::now();
                const USERS: u32 = 400;
                b.iter(|| {
                    let engine = Arc::new(seeded_engine(sessions, USERS, USERS, now));

                    (1..=USERS).into_par_iter().for_each(|user| {
                        let session = SessionId(user % sessions + 1);
                        let _ = engine.create_reservation(UserId(user), session, now);
                    });

                    black_box(&engine);
                })
            },
        );
    }
    group.finish();
}

// =============================================================================
// Criterion Groups
// =============================================================================

criterion_group!(
    single_threaded,
    bench_single_booking,
    bench_booking_cancellation_pair,
    bench_booking_throughput,
);

criterion_group!(waitlist, bench_waitlist_churn,);

criterion_group!(
    multi_threaded,
    bench_parallel_bookings_one_session,
    bench_parallel_bookings_spread_sessions,
    bench_contention_levels,
);

criterion_main!(single_threaded, waitlist, multi_threaded);
