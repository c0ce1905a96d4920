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

//! Notification sink boundary.
//!
//! Delivery transport (push, email, SMS) lives outside this crate. The
//! engine fires events into a [`NotificationSink`] and moves on; a sink that
//! drops events on the floor can never roll back a booking.

use crate::base::{EntryId, ReservationId, SessionId, UserId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// What happened, from the notified user's point of view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Booked,
    Cancelled,
    Waitlisted,
    SeatAvailable,
    SessionCancelled,
}

/// The entity a notification refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum RelatedEntity {
    Reservation(ReservationId),
    WaitlistEntry(EntryId),
    Session(SessionId),
}

/// Fire-and-forget notification outlet.
///
/// Implementations must not block for long and must not panic; the engine
/// calls this inside booking and cancellation flows and ignores delivery
/// problems by design.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, user_id: UserId, kind: NotificationKind, related: RelatedEntity);
}

/// Discards every notification. The engine's default sink.
#[derive(Debug, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _user_id: UserId, _kind: NotificationKind, _related: RelatedEntity) {}
}

/// A recorded notification, as kept by [`MemorySink`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Notification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub related: RelatedEntity,
    pub created_at: DateTime<Utc>,
}

/// Buffers notifications in memory, newest last. Used by tests and by the
/// demo server's in-app notification listing.
#[derive(Debug, Default)]
pub struct MemorySink {
    notifications: Mutex<Vec<Notification>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    pub fn for_user(&self, user_id: UserId) -> Vec<Notification> {
        self.notifications
            .lock()
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.notifications.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.lock().is_empty()
    }
}

impl NotificationSink for MemorySink {
    fn notify(&self, user_id: UserId, kind: NotificationKind, related: RelatedEntity) {
        self.notifications.lock().push(Notification {
            user_id,
            kind,
            related,
            created_at: Utc::now(),
        });
    }
}
