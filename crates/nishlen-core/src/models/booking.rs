//! Booking model
//!
//! A booking reserves exactly one slot for exactly one service. Its status
//! moves along a small state machine:
//!
//! ```text
//! (create) -> pending -> confirmed
//!     |          |           |
//!     |          +-----------+--> cancelled
//!     +--------> confirmed
//! confirmed -> completed   (external trigger)
//! ```
//!
//! `cancelled` and `completed` are absorbing.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Booking status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Waiting for the master's confirmation
    #[default]
    Pending,
    /// Confirmed by the master or by policy
    Confirmed,
    /// Service delivered
    Completed,
    /// Cancelled by the client or the master
    Cancelled,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "completed" => Some(BookingStatus::Completed),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    /// No transition leaves an absorbing state
    pub fn is_final(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Check whether `self -> next` is a legal transition
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Completed)
        )
    }

    /// Whether moving `self -> next` hands the slot back to the ledger.
    ///
    /// Only a booking cancelled while still pending frees its slot; a
    /// cancelled confirmed booking keeps the slot consumed.
    pub fn releases_slot(&self, next: BookingStatus) -> bool {
        *self == BookingStatus::Pending && next == BookingStatus::Cancelled
    }
}

/// Booking entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    /// Unique identifier
    pub id: Uuid,

    /// Registered client, absent for guest requests
    pub client_id: Option<Uuid>,

    /// Subject id of whoever made the request, guests included
    pub requested_by: Uuid,

    /// Master providing the service
    pub master_id: Uuid,

    /// Booked service
    pub service_id: Uuid,

    /// Consumed slot
    pub slot_id: Uuid,

    /// Current status
    pub status: BookingStatus,

    /// Free-text notes from the requester
    pub notes: Option<String>,

    /// Amount prepaid for the booking
    pub prepayment_amount: Decimal,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Set once, on the pending -> confirmed transition
    pub confirmed_at: Option<DateTime<Utc>>,

    /// Set by the external completion trigger
    pub completed_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// Materialize a booking from a request and its decided initial status
    pub fn from_request(request: &NewBooking) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            client_id: request.client_id,
            requested_by: request.requested_by,
            master_id: request.master_id,
            service_id: request.service_id,
            slot_id: request.slot_id,
            status: request.status,
            notes: request.notes.clone(),
            prepayment_amount: Decimal::ZERO,
            created_at: now,
            confirmed_at: None,
            completed_at: None,
        }
    }

    /// Check whether `user_id` is a party of this booking: its master, its
    /// registered client or the requester who created it
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.master_id == user_id
            || self.client_id == Some(user_id)
            || self.requested_by == user_id
    }

    /// Apply a status change in memory, stamping the matching timestamp
    pub fn apply_status(&mut self, next: BookingStatus, at: DateTime<Utc>) {
        match next {
            BookingStatus::Confirmed if self.confirmed_at.is_none() => {
                self.confirmed_at = Some(at)
            }
            BookingStatus::Completed if self.completed_at.is_none() => {
                self.completed_at = Some(at)
            }
            _ => {}
        }
        self.status = next;
    }
}

/// Booking insert request, produced by the state machine after all checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBooking {
    pub client_id: Option<Uuid>,
    pub requested_by: Uuid,
    pub master_id: Uuid,
    pub service_id: Uuid,
    pub slot_id: Uuid,
    pub status: BookingStatus,
    pub notes: Option<String>,
}
