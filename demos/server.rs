//! Simple REST API server example for the booking engine.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `POST /commands` - Execute a booking command (book, cancel, attend, no_show, drop_waitlist)
//! - `POST /sessions` - Register a session from the schedule catalog
//! - `POST /grants` - Register a credit grant from the package catalog
//! - `GET /sessions` - List all sessions
//! - `GET /sessions/:id` - Get a session by ID
//! - `GET /sessions/:id/waitlist` - Get a session's waitlist
//! - `GET /users/:id/reservations` - List a user's reservations
//! - `GET /users/:id/grants` - List a user's credit grants
//! - `GET /users/:id/notifications` - List a user's in-app notifications
//!
//! ## Example Usage
//!
//! ```bash
//! # Register a session (times in RFC 3339)
//! curl -X POST http://localhost:3000/sessions \
//!   -H "Content-Type: application/json" \
//!   -d '{"session_id": 1, "class_name": "Reformer Flow", "instructor": 900,
//!        "start_time": "2025-06-01T18:00:00Z", "end_time": "2025-06-01T19:00:00Z",
//!        "capacity": 10}'
//!
//! # Register a grant
//! curl -X POST http://localhost:3000/grants \
//!   -H "Content-Type: application/json" \
//!   -d '{"grant_id": 1, "user_id": 7, "total": 8,
//!        "purchase_date": "2025-05-01T00:00:00Z", "expiry_date": "2025-07-01T00:00:00Z"}'
//!
//! # Book a seat
//! curl -X POST http://localhost:3000/commands \
//!   -H "Content-Type: application/json" \
//!   -d '{"type": "book", "user_id": 7, "session_id": 1}'
//!
//! # Inspect the session
//! curl http://localhost:3000/sessions/1
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use studio_booking_rs::{
    BookingEngine, BookingError, BookingOutcome, BookingPolicy, CreditGrant, EntryId,
    GrantId, GrantSnapshot, MemorySink, Notification, ReservationId, ReservationSnapshot,
    Session, SessionId, SessionSnapshot, UserId, WaitlistEntry,
};
use tokio::net::TcpListener;

// === Request/Response DTOs ===

/// Request body for booking commands.
///
/// Uses a tagged enum for clean JSON representation:
/// ```json
/// {"type": "book", "user_id": 7, "session_id": 1}
/// ```
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandRequest {
    Book {
        user_id: u32,
        session_id: u32,
    },
    Cancel {
        user_id: u32,
        reservation_id: ReservationId,
        reason: Option<String>,
    },
    Attend {
        reservation_id: ReservationId,
    },
    NoShow {
        reservation_id: ReservationId,
    },
    DropWaitlist {
        user_id: u32,
        entry_id: EntryId,
    },
}

/// Request body for registering a session.
#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub session_id: u32,
    pub class_name: String,
    pub instructor: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub capacity: u32,
}

/// Request body for registering a credit grant.
#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub grant_id: u32,
    pub user_id: u32,
    pub total: u32,
    pub purchase_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
}

/// Response body for booking commands.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandResponse {
    Confirmed { reservation: ReservationSnapshot },
    Waitlisted { entry_id: EntryId, position: u32 },
    Cancelled { reservation: ReservationSnapshot },
    Marked { reservation: ReservationSnapshot },
    Dropped { entry_id: EntryId },
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the booking engine and the in-memory
/// notification sink backing the notification listing.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BookingEngine>,
    pub sink: Arc<MemorySink>,
}

// === Error Handling ===

/// Wrapper for converting `BookingError` into HTTP responses.
pub struct AppError(BookingError);

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            BookingError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
            BookingError::SessionNotFound => (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND"),
            BookingError::GrantNotFound => (StatusCode::NOT_FOUND, "GRANT_NOT_FOUND"),
            BookingError::ReservationNotFound => {
                (StatusCode::NOT_FOUND, "RESERVATION_NOT_FOUND")
            }
            BookingError::WaitlistEntryNotFound => {
                (StatusCode::NOT_FOUND, "WAITLIST_ENTRY_NOT_FOUND")
            }
            BookingError::NoActiveCredit => {
                (StatusCode::UNPROCESSABLE_ENTITY, "NO_ACTIVE_CREDIT")
            }
            BookingError::CreditExhausted => {
                (StatusCode::UNPROCESSABLE_ENTITY, "CREDIT_EXHAUSTED")
            }
            BookingError::NothingToRefund => (StatusCode::CONFLICT, "NOTHING_TO_REFUND"),
            BookingError::SessionFull => (StatusCode::CONFLICT, "SESSION_FULL"),
            BookingError::SessionNotBookable => (StatusCode::CONFLICT, "SESSION_NOT_BOOKABLE"),
            BookingError::OutsideBookingWindow => {
                (StatusCode::UNPROCESSABLE_ENTITY, "OUTSIDE_BOOKING_WINDOW")
            }
            BookingError::DuplicateReservation => {
                (StatusCode::CONFLICT, "DUPLICATE_RESERVATION")
            }
            BookingError::DuplicateSession => (StatusCode::CONFLICT, "DUPLICATE_SESSION"),
            BookingError::DuplicateGrant => (StatusCode::CONFLICT, "DUPLICATE_GRANT"),
            BookingError::AlreadyCancelled => (StatusCode::CONFLICT, "ALREADY_CANCELLED"),
            BookingError::AlreadyWaitlisted => (StatusCode::CONFLICT, "ALREADY_WAITLISTED"),
            BookingError::CancellationWindowPassed => {
                (StatusCode::UNPROCESSABLE_ENTITY, "CANCELLATION_WINDOW_PASSED")
            }
            BookingError::NothingToRelease => (StatusCode::CONFLICT, "NOTHING_TO_RELEASE"),
            BookingError::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, "INVALID_TRANSITION")
            }
            BookingError::ConcurrencyConflict => {
                (StatusCode::SERVICE_UNAVAILABLE, "CONCURRENCY_CONFLICT")
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

async fn execute_command(
    State(state): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, AppError> {
    let now = Utc::now();
    let response = match request {
        CommandRequest::Book {
            user_id,
            session_id,
        } => {
            let outcome = state.engine.create_reservation_with_retry(
                UserId(user_id),
                SessionId(session_id),
                now,
            )?;
            match outcome {
                BookingOutcome::Confirmed(reservation) => {
                    CommandResponse::Confirmed { reservation }
                }
                BookingOutcome::Waitlisted { entry_id, position } => {
                    CommandResponse::Waitlisted { entry_id, position }
                }
            }
        }
        CommandRequest::Cancel {
            user_id,
            reservation_id,
            reason,
        } => {
            let reservation =
                state
                    .engine
                    .cancel_reservation(reservation_id, UserId(user_id), reason, now)?;
            CommandResponse::Cancelled { reservation }
        }
        CommandRequest::Attend { reservation_id } => {
            let reservation = state.engine.mark_attended(reservation_id, now)?;
            CommandResponse::Marked { reservation }
        }
        CommandRequest::NoShow { reservation_id } => {
            let reservation = state.engine.mark_no_show(reservation_id, now)?;
            CommandResponse::Marked { reservation }
        }
        CommandRequest::DropWaitlist { user_id, entry_id } => {
            let entry = state.engine.remove_from_waitlist(entry_id, UserId(user_id))?;
            CommandResponse::Dropped { entry_id: entry.id }
        }
    };
    Ok(Json(response))
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<SessionRequest>,
) -> Result<StatusCode, AppError> {
    let session = Session::new(
        SessionId(request.session_id),
        request.class_name,
        UserId(request.instructor),
        request.start_time,
        request.end_time,
        request.capacity,
    );
    state.engine.add_session(session)?;
    Ok(StatusCode::CREATED)
}

async fn create_grant(
    State(state): State<AppState>,
    Json(request): Json<GrantRequest>,
) -> Result<StatusCode, AppError> {
    let grant = CreditGrant::new(
        GrantId(request.grant_id),
        UserId(request.user_id),
        request.total,
        request.purchase_date,
        request.expiry_date,
    );
    state.engine.add_grant(grant)?;
    Ok(StatusCode::CREATED)
}

async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSnapshot>> {
    Json(state.engine.sessions())
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<SessionSnapshot>, AppError> {
    state
        .engine
        .session(SessionId(id))
        .map(Json)
        .ok_or(AppError(BookingError::SessionNotFound))
}

async fn get_session_waitlist(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<Vec<WaitlistEntry>>, AppError> {
    if state.engine.session(SessionId(id)).is_none() {
        return Err(AppError(BookingError::SessionNotFound));
    }
    Ok(Json(state.engine.session_waitlist(SessionId(id))))
}

async fn list_user_reservations(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Json<Vec<ReservationSnapshot>> {
    Json(state.engine.user_reservations(UserId(id)))
}

async fn list_user_grants(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Json<Vec<GrantSnapshot>> {
    Json(state.engine.user_grants(UserId(id), Utc::now()))
}

async fn list_user_notifications(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Json<Vec<Notification>> {
    Json(state.sink.for_user(UserId(id)))
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/commands", post(execute_command))
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/waitlist", get(get_session_waitlist))
        .route("/grants", post(create_grant))
        .route("/users/{id}/reservations", get(list_user_reservations))
        .route("/users/{id}/grants", get(list_user_grants))
        .route("/users/{id}/notifications", get(list_user_notifications))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studio_booking_rs=info,server=info".into()),
        )
        .init();

    let sink = Arc::new(MemorySink::new());
    let state = AppState {
        engine: Arc::new(BookingEngine::with(BookingPolicy::default(), sink.clone())),
        sink,
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    println!("Booking API server running on http://127.0.0.1:3000");
    println!();
    println!("Endpoints:");
    println!("  POST /commands                  - Execute a booking command");
    println!("  POST /sessions                  - Register a session");
    println!("  POST /grants                    - Register a credit grant");
    println!("  GET  /sessions                  - List sessions");
    println!("  GET  /sessions/:id              - Get session by ID");
    println!("  GET  /sessions/:id/waitlist     - Get session waitlist");
    println!("  GET  /users/:id/reservations    - List a user's reservations");
    println!("  GET  /users/:id/grants          - List a user's grants");
    println!("  GET  /users/:id/notifications   - List a user's notifications");

    axum::serve(listener, app).await.unwrap();
}
