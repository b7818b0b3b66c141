//! Authorization policy
//!
//! One function per operation, each taking the caller and the target
//! resource and returning `Ok(())` or `AppError::Forbidden`. The functions
//! are pure so they can be tested without a store or transport.

use uuid::Uuid;

use crate::models::{Booking, BookingStatus, Caller, Master, UserRole};
use crate::{AppError, AppResult};

/// Acting for `master`: the master themself, or an admin of one of the
/// master's salons
fn acts_for(caller: &Caller, master: &Master) -> bool {
    caller.id == master.id
        || (caller.role == UserRole::SalonAdmin && master.is_managed_by(caller.id))
}

/// Masters manage their own schedule; their salon admin may act as delegate
pub fn can_publish_slot(caller: &Caller, master: &Master) -> AppResult<()> {
    if acts_for(caller, master) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "caller {} cannot publish slots for master {}",
            caller.id, master.id
        )))
    }
}

/// Same rule as slot publishing
pub fn can_manage_services(caller: &Caller, master: &Master) -> AppResult<()> {
    if acts_for(caller, master) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "caller {} cannot manage services of master {}",
            caller.id, master.id
        )))
    }
}

/// Only the booking's master confirms, and only a pending booking
pub fn can_confirm(caller: &Caller, booking: &Booking) -> AppResult<()> {
    if caller.id != booking.master_id {
        return Err(AppError::Forbidden(format!(
            "only the master can confirm booking {}",
            booking.id
        )));
    }
    if booking.status != BookingStatus::Pending {
        return Err(AppError::Forbidden(format!(
            "booking {} is {} and cannot be confirmed",
            booking.id, booking.status
        )));
    }
    Ok(())
}

/// A party of the booking may cancel while it is still live
pub fn can_cancel(caller: &Caller, booking: &Booking) -> AppResult<()> {
    if !booking.involves(caller.id) {
        return Err(AppError::Forbidden(format!(
            "caller {} is not a party of booking {}",
            caller.id, booking.id
        )));
    }
    if booking.status.is_final() {
        return Err(AppError::Forbidden(format!(
            "booking {} is already {}",
            booking.id, booking.status
        )));
    }
    Ok(())
}

/// Booking history is visible to its owner only
pub fn can_view_client_bookings(caller: &Caller, client_id: Uuid) -> AppResult<()> {
    if caller.id == client_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "caller {} cannot view bookings of client {}",
            caller.id, client_id
        )))
    }
}
