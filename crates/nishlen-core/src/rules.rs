//! Availability rules engine
//!
//! Decides the initial status of a new booking from the requester's
//! registration state and the master's confirmation policy.

use crate::models::{BookingStatus, ConfirmationPolicy};

/// Initial status for a new booking.
///
/// Guests always start `pending`. Registered clients start `confirmed`
/// unless the master requires confirmation for everyone.
pub fn initial_status(is_registered_client: bool, policy: &ConfirmationPolicy) -> BookingStatus {
    if !is_registered_client || (policy.require_confirmation && policy.confirmation_for_all) {
        BookingStatus::Pending
    } else {
        BookingStatus::Confirmed
    }
}
