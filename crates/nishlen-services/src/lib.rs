//! Business logic services for Nishlen booking
//!
//! This crate orchestrates the booking core on top of the repository and
//! notifier traits from nishlen-core.
//!
//! # Architecture
//!
//! Services are generic over their storage so the same logic runs against
//! PostgreSQL in production and the in-process store in tests:
//! - Each service owns `Arc`s of the repositories it needs
//! - Authorization goes through the pure functions in `nishlen_core::policy`
//! - All operations are instrumented with tracing
//!
//! # Services
//!
//! - `SlotLedger` - Slot publishing, listing, reservation and release
//! - `BookingManager` - Booking state machine
//! - `Catalog` - Service catalog and recent-events queries
//! - `OutboxRelay` - Delivers recorded events to subscribers

pub mod booking_manager;
pub mod catalog;
pub mod outbox_relay;
pub mod slot_ledger;

pub use booking_manager::BookingManager;
pub use catalog::Catalog;
pub use outbox_relay::OutboxRelay;
pub use slot_ledger::SlotLedger;

/// Business logic constants
pub mod constants {
    /// Events returned by `recent_events` when no limit is configured
    pub const DEFAULT_RECENT_EVENTS: usize = 10;

    /// Default outbox poll interval in milliseconds
    pub const DEFAULT_RELAY_INTERVAL_MS: u64 = 500;

    /// Default number of outbox entries delivered per poll
    pub const DEFAULT_RELAY_BATCH: usize = 100;
}
