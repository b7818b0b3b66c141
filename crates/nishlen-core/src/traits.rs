//! Common traits for repositories and the event notifier
//!
//! Every mutating repository method is one atomic unit against the store:
//! its checks, its writes and the matching outbox event commit together or
//! not at all.

use crate::error::AppError;
use crate::models::{
    Booking, BookingEvent, BookingStatus, Master, NewBooking, NewSlot, OutboxEntry, Service,
    ServiceFilter, Slot,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

/// Slot ledger storage
#[async_trait]
pub trait SlotRepository: Send + Sync {
    /// Find slot by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Slot>, AppError>;

    /// Insert a slot unless it overlaps another slot of the same master and date.
    ///
    /// Fails with `SlotOverlap` on overlap.
    async fn publish(&self, request: &NewSlot) -> Result<Slot, AppError>;

    /// Available slots of a master on a date, ordered by start time
    async fn list_available(&self, master_id: Uuid, date: NaiveDate)
        -> Result<Vec<Slot>, AppError>;

    /// Flip an available slot to unavailable.
    ///
    /// Fails with `SlotNotFound` or `SlotUnavailable`.
    async fn reserve(&self, id: Uuid) -> Result<Slot, AppError>;

    /// Flip a slot back to available; idempotent
    async fn release(&self, id: Uuid) -> Result<Slot, AppError>;
}

/// Booking storage
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Find booking by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, AppError>;

    /// Reserve the request's slot and insert the booking in one transaction,
    /// recording a `booking_created` event.
    ///
    /// Fails with `SlotNotFound` or `SlotUnavailable` when the slot cannot be
    /// reserved; nothing is written in that case.
    async fn create_reserving_slot(&self, request: &NewBooking) -> Result<Booking, AppError>;

    /// Compare-and-set the booking status from `from` to `to`.
    ///
    /// Stamps `confirmed_at` on confirmation, releases the slot when
    /// `from.releases_slot(to)`, and records the matching event. Fails with
    /// `Conflict` if the stored status is no longer `from`.
    async fn transition(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<Booking, AppError>;

    /// Bookings of a client, newest first
    async fn list_by_client(&self, client_id: Uuid) -> Result<Vec<Booking>, AppError>;
}

/// Service catalog storage
#[async_trait]
pub trait ServiceRepository: Send + Sync {
    /// Find service by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Service>, AppError>;

    /// Create a new service
    async fn create(&self, service: &Service) -> Result<Service, AppError>;

    /// List services matching the filter
    async fn list(&self, filter: &ServiceFilter) -> Result<Vec<Service>, AppError>;
}

/// Read access to masters in the identity schema
#[async_trait]
pub trait MasterRepository: Send + Sync {
    /// Find master by ID, with the confirmation policy already parsed
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Master>, AppError>;
}

/// Transactional outbox of booking events
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Oldest undelivered entries, in creation order
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, AppError>;

    /// Mark entries as delivered
    async fn mark_delivered(&self, ids: &[i64]) -> Result<(), AppError>;

    /// Count a failed delivery attempt
    async fn record_failure(&self, id: i64, reason: &str) -> Result<(), AppError>;
}

/// External subscriber channel plus the bounded recent-events log
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Deliver one event to subscribers and append it to the recent log
    async fn publish(&self, event: &BookingEvent) -> Result<(), AppError>;

    /// Most recent events, newest first
    async fn recent(&self, limit: usize) -> Result<Vec<BookingEvent>, AppError>;
}
