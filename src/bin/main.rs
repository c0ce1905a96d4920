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

use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use csv::{ReaderBuilder, Trim, Writer};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use studio_booking_rs::{
    BookingEngine, BookingError, CreditGrant, EntryId, GrantId, ReservationId,
    ReservationStatus, Session, SessionId, UserId, WaitlistStatus,
};

/// Booking Engine - Process booking command CSV files
///
/// Seeds sessions and credit grants from CSV catalogs, streams booking
/// commands through the engine, and outputs final state to stdout.
#[derive(Parser, Debug)]
#[command(name = "studio-booking-rs")]
#[command(about = "A booking engine that processes booking-command CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with booking commands
    ///
    /// Expected format: op,user,session,reason,at
    /// Example: cargo run -- --sessions sessions.csv --grants grants.csv commands.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Path to CSV file with sessions (session,class,instructor,start,end,capacity)
    #[arg(long, value_name = "FILE")]
    sessions: PathBuf,

    /// Path to CSV file with credit grants (grant,user,total,purchase,expiry)
    #[arg(long, value_name = "FILE")]
    grants: PathBuf,

    /// Which state table to print when the batch finishes
    #[arg(long, value_enum, default_value_t = Output::Reservations)]
    output: Output,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Output {
    /// Reservation states in booking order
    Reservations,
    /// Credit grant balances
    Grants,
}

fn main() {
    let args = Args::parse();

    let engine = BookingEngine::new();

    if let Err(e) = seed_sessions(&engine, &args.sessions) {
        eprintln!("Error loading sessions '{}': {}", args.sessions.display(), e);
        process::exit(1);
    }
    if let Err(e) = seed_grants(&engine, &args.grants) {
        eprintln!("Error loading grants '{}': {}", args.grants.display(), e);
        process::exit(1);
    }

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    if let Err(e) = process_commands(&engine, BufReader::new(file)) {
        eprintln!("Error processing commands: {}", e);
        process::exit(1);
    }

    let result = match args.output {
        Output::Reservations => write_reservations(&engine, std::io::stdout()),
        Output::Grants => write_grants(&engine, std::io::stdout()),
    };
    if let Err(e) = result {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw session catalog record.
///
/// Fields: `session, class, instructor, start, end, capacity`
/// (timestamps in RFC 3339).
#[derive(Debug, serde::Deserialize)]
struct SessionRecord {
    session: u32,
    class: String,
    instructor: u32,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    capacity: u32,
}

/// Raw grant catalog record.
///
/// Fields: `grant, user, total, purchase, expiry`.
#[derive(Debug, serde::Deserialize)]
struct GrantRecord {
    grant: u32,
    user: u32,
    total: u32,
    purchase: DateTime<Utc>,
    expiry: DateTime<Utc>,
}

/// Raw booking command record.
///
/// Fields: `op, user, session, reason, at`. The `at` column carries the
/// command's logical timestamp; when empty the wall clock is used.
#[derive(Debug, serde::Deserialize)]
struct CommandRecord {
    op: String,
    user: u32,
    session: u32,
    reason: Option<String>,
    at: Option<DateTime<Utc>>,
}

fn seed_sessions(engine: &BookingEngine, path: &Path) -> Result<(), csv::Error> {
    let file = File::open(path).map_err(csv::Error::from)?;
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(BufReader::new(file));

    for result in rdr.deserialize::<SessionRecord>() {
        let record = result?;
        let session = Session::new(
            SessionId(record.session),
            record.class,
            UserId(record.instructor),
            record.start,
            record.end,
            record.capacity,
        );
        if let Err(e) = engine.add_session(session) {
            eprintln!("Skipping session {}: {}", record.session, e);
        }
    }
    Ok(())
}

fn seed_grants(engine: &BookingEngine, path: &Path) -> Result<(), csv::Error> {
    let file = File::open(path).map_err(csv::Error::from)?;
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(BufReader::new(file));

    for result in rdr.deserialize::<GrantRecord>() {
        let record = result?;
        let grant = CreditGrant::new(
            GrantId(record.grant),
            UserId(record.user),
            record.total,
            record.purchase,
            record.expiry,
        );
        if let Err(e) = engine.add_grant(grant) {
            eprintln!("Skipping grant {}: {}", record.grant, e);
        }
    }
    Ok(())
}

/// Process booking commands from a CSV reader.
///
/// Streaming: arbitrarily large command files are handled row by row.
/// Malformed rows and failed commands are skipped with a note on stderr;
/// a bad command never stops the batch.
///
/// # Commands
///
/// | op | Behavior |
/// |----|----------|
/// | book | Reserve a seat, or join the waitlist if the session is full |
/// | cancel | Cancel the user's live reservation for the session |
/// | attend | Mark the user's reservation attended |
/// | no_show | Mark the user's reservation a no-show |
/// | drop_waitlist | Leave the session's waitlist |
pub fn process_commands<R: Read>(engine: &BookingEngine, reader: R) -> Result<(), csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true) // Allow missing reason/at fields
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<CommandRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                eprintln!("Skipping malformed row: {}", e);
                continue;
            }
        };

        let user = UserId(record.user);
        let session = SessionId(record.session);
        let now = record.at.unwrap_or_else(Utc::now);

        let outcome = match record.op.to_lowercase().as_str() {
            "book" => engine
                .create_reservation_with_retry(user, session, now)
                .map(|_| ()),
            "cancel" => live_reservation(engine, user, session)
                .and_then(|id| engine.cancel_reservation(id, user, record.reason.clone(), now))
                .map(|_| ()),
            "attend" => live_reservation(engine, user, session)
                .and_then(|id| engine.mark_attended(id, now))
                .map(|_| ()),
            "no_show" => live_reservation(engine, user, session)
                .and_then(|id| engine.mark_no_show(id, now))
                .map(|_| ()),
            "drop_waitlist" => active_waitlist_entry(engine, user, session)
                .and_then(|id| engine.remove_from_waitlist(id, user))
                .map(|_| ()),
            other => {
                eprintln!("Skipping unknown command '{}'", other);
                continue;
            }
        };

        if let Err(e) = outcome {
            eprintln!("Skipping {} for user {}: {}", record.op, user, e);
        }
    }

    Ok(())
}

/// Resolves the user's live (confirmed) reservation for a session; batch
/// commands address reservations by the (user, session) pair since engine
/// IDs are not known up front.
fn live_reservation(
    engine: &BookingEngine,
    user: UserId,
    session: SessionId,
) -> Result<ReservationId, BookingError> {
    engine
        .user_reservations(user)
        .into_iter()
        .find(|r| r.session_id == session && r.status == ReservationStatus::Confirmed)
        .map(|r| r.id)
        .ok_or(BookingError::ReservationNotFound)
}

fn active_waitlist_entry(
    engine: &BookingEngine,
    user: UserId,
    session: SessionId,
) -> Result<EntryId, BookingError> {
    engine
        .session_waitlist(session)
        .into_iter()
        .find(|e| {
            e.user_id == user
                && matches!(e.status, WaitlistStatus::Waiting | WaitlistStatus::Notified)
        })
        .map(|e| e.id)
        .ok_or(BookingError::WaitlistEntryNotFound)
}

/// Write reservation states to a CSV writer, in booking order.
///
/// Columns: `reservation, user, session, grant, status, reserved_at, cancelled_at`
pub fn write_reservations<W: Write>(
    engine: &BookingEngine,
    writer: W,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record([
        "reservation",
        "user",
        "session",
        "grant",
        "status",
        "reserved_at",
        "cancelled_at",
    ])?;

    for id in engine.drain_booking_log() {
        let Some(r) = engine.reservation(id) else {
            continue;
        };
        wtr.write_record([
            r.id.to_string(),
            r.user_id.to_string(),
            r.session_id.to_string(),
            r.grant_id.to_string(),
            r.status.as_str().to_string(),
            r.reserved_at.to_rfc3339(),
            r.cancelled_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write grant balances to a CSV writer.
///
/// Columns: `grant, user, total, used, remaining, status`
pub fn write_grants<W: Write>(
    engine: &BookingEngine,
    writer: W,
) -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now();
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(["grant", "user", "total", "used", "remaining", "status"])?;

    let mut snapshots = engine.all_grants(now);
    snapshots.sort_by_key(|g| g.id.0);
    for g in snapshots {
        wtr.write_record([
            g.id.to_string(),
            g.user_id.to_string(),
            g.total.to_string(),
            g.used.to_string(),
            g.remaining.to_string(),
            g.status.as_str().to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
