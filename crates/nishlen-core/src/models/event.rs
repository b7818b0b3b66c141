//! Booking lifecycle events and outbox records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::booking::{Booking, BookingStatus};

/// Event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    BookingCreated,
    BookingConfirmed,
    BookingCancelled,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::BookingCreated => "booking_created",
            EventKind::BookingConfirmed => "booking_confirmed",
            EventKind::BookingCancelled => "booking_cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "booking_created" => Some(EventKind::BookingCreated),
            "booking_confirmed" => Some(EventKind::BookingConfirmed),
            "booking_cancelled" => Some(EventKind::BookingCancelled),
            _ => None,
        }
    }

    /// Event emitted when a booking moves into `status`
    pub fn for_transition(status: BookingStatus) -> Option<Self> {
        match status {
            BookingStatus::Confirmed => Some(EventKind::BookingConfirmed),
            BookingStatus::Cancelled => Some(EventKind::BookingCancelled),
            _ => None,
        }
    }
}

/// Wire payload published to subscribers and kept in the recent-events log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingEvent {
    #[serde(rename = "event")]
    pub kind: EventKind,
    pub booking_id: Uuid,
    pub status: BookingStatus,
}

impl BookingEvent {
    pub fn new(kind: EventKind, booking: &Booking) -> Self {
        Self {
            kind,
            booking_id: booking.id,
            status: booking.status,
        }
    }

    pub fn created(booking: &Booking) -> Self {
        Self::new(EventKind::BookingCreated, booking)
    }
}

/// Event row written in the same transaction as the state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Monotonic sequence assigned by the store
    pub id: i64,
    pub event: BookingEvent,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    /// Failed delivery attempts so far
    pub attempts: i32,
}
