//! Domain models for Nishlen booking
//!
//! This module contains all the core domain models used throughout the application.

pub mod booking;
pub mod event;
pub mod master;
pub mod service;
pub mod slot;

pub use booking::{Booking, BookingStatus, NewBooking};
pub use event::{BookingEvent, EventKind, OutboxEntry};
pub use master::{Caller, ConfirmationPolicy, Master, UserRole};
pub use service::{NewService, Service, ServiceFilter};
pub use slot::{windows_overlap, NewSlot, Slot};
