//! Booking state machine
//!
//! Creates bookings against available slots and drives them through
//! `pending -> confirmed -> cancelled`. Every transition is a
//! compare-and-set on the status observed during authorization, and the
//! slot flip plus the lifecycle event commit in the same store transaction
//! as the status change.

use nishlen_core::{
    models::{Booking, BookingStatus, Caller, NewBooking},
    policy, rules,
    traits::{BookingRepository, MasterRepository, ServiceRepository, SlotRepository},
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Booking manager
///
/// Handles booking creation and status transitions.
pub struct BookingManager<B, S, V, M>
where
    B: BookingRepository,
    S: SlotRepository,
    V: ServiceRepository,
    M: MasterRepository,
{
    booking_repo: Arc<B>,
    slot_repo: Arc<S>,
    service_repo: Arc<V>,
    master_repo: Arc<M>,
}

impl<B, S, V, M> BookingManager<B, S, V, M>
where
    B: BookingRepository,
    S: SlotRepository,
    V: ServiceRepository,
    M: MasterRepository,
{
    /// Create a new booking manager
    pub fn new(
        booking_repo: Arc<B>,
        slot_repo: Arc<S>,
        service_repo: Arc<V>,
        master_repo: Arc<M>,
    ) -> Self {
        Self {
            booking_repo,
            slot_repo,
            service_repo,
            master_repo,
        }
    }

    /// Request a booking of `service_id` with `master_id` in `slot_id`
    ///
    /// The initial status comes from the master's confirmation policy. Only
    /// callers with the `client` role are recorded as the booking's client.
    ///
    /// # Errors
    ///
    /// - `SlotUnavailable` if the slot is missing, taken, belongs to another
    ///   master, or is lost to a concurrent request
    /// - `ServiceNotFound` if the master does not offer the service
    /// - `MasterNotFound` if the master does not exist
    #[instrument(skip(self, caller, notes), fields(caller = %caller.id))]
    pub async fn create_booking(
        &self,
        caller: &Caller,
        master_id: Uuid,
        service_id: Uuid,
        slot_id: Uuid,
        notes: Option<String>,
    ) -> AppResult<Booking> {
        match self.slot_repo.find_by_id(slot_id).await? {
            Some(slot) if slot.is_available && slot.master_id == master_id => {}
            _ => {
                warn!("Slot {} not available for master {}", slot_id, master_id);
                return Err(AppError::SlotUnavailable(slot_id.to_string()));
            }
        }

        match self.service_repo.find_by_id(service_id).await? {
            Some(service) if service.master_id == master_id => {}
            _ => {
                warn!("Service {} not offered by master {}", service_id, master_id);
                return Err(AppError::ServiceNotFound(service_id.to_string()));
            }
        }

        let master = self
            .master_repo
            .find_by_id(master_id)
            .await?
            .ok_or_else(|| AppError::MasterNotFound(master_id.to_string()))?;

        let registered = caller.is_registered_client();
        let status = rules::initial_status(registered, &master.policy);

        let request = NewBooking {
            client_id: registered.then_some(caller.id),
            requested_by: caller.id,
            master_id,
            service_id,
            slot_id,
            status,
            notes,
        };

        let booking = self
            .booking_repo
            .create_reserving_slot(&request)
            .await
            .map_err(|e| match e {
                // Deleted between the check and the reservation
                AppError::SlotNotFound(id) => AppError::SlotUnavailable(id),
                other => other,
            })?;

        info!(
            "Booking {} created as {} for slot {}",
            booking.id, booking.status, slot_id
        );
        Ok(booking)
    }

    /// Confirm a pending booking; only its master may do so
    #[instrument(skip(self, caller), fields(caller = %caller.id))]
    pub async fn confirm_booking(&self, caller: &Caller, booking_id: Uuid) -> AppResult<Booking> {
        let booking = self.load(booking_id).await?;

        policy::can_confirm(caller, &booking).map_err(|e| {
            warn!("Rejected confirm: {}", e);
            e
        })?;

        let confirmed = self
            .booking_repo
            .transition(booking_id, booking.status, BookingStatus::Confirmed)
            .await?;

        info!("Booking {} confirmed by {}", booking_id, caller.id);
        Ok(confirmed)
    }

    /// Cancel a live booking
    ///
    /// The slot goes back to the ledger only when the booking was still
    /// pending; a confirmed booking keeps its slot consumed.
    #[instrument(skip(self, caller), fields(caller = %caller.id))]
    pub async fn cancel_booking(&self, caller: &Caller, booking_id: Uuid) -> AppResult<Booking> {
        let booking = self.load(booking_id).await?;

        policy::can_cancel(caller, &booking).map_err(|e| {
            warn!("Rejected cancel: {}", e);
            e
        })?;

        let cancelled = self
            .booking_repo
            .transition(booking_id, booking.status, BookingStatus::Cancelled)
            .await?;

        info!(
            "Booking {} cancelled by {} (was {})",
            booking_id, caller.id, booking.status
        );
        Ok(cancelled)
    }

    /// Bookings of a client, newest first; visible to that client only
    #[instrument(skip(self, caller), fields(caller = %caller.id))]
    pub async fn list_my_bookings(&self, caller: &Caller, client_id: Uuid) -> AppResult<Vec<Booking>> {
        policy::can_view_client_bookings(caller, client_id)?;
        self.booking_repo.list_by_client(client_id).await
    }

    async fn load(&self, booking_id: Uuid) -> AppResult<Booking> {
        self.booking_repo
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| AppError::BookingNotFound(booking_id.to_string()))
    }
}
