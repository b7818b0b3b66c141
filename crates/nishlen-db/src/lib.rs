//! Nishlen Database Layer
//!
//! PostgreSQL access for the booking core:
//!
//! - Connection pool management and embedded migrations
//! - Repository implementations for slots, bookings, services and masters
//! - The transactional event outbox
//! - An in-process store with the same transactional guarantees, used by
//!   tests and local runs without a database

pub mod pool;
pub mod repositories;

pub use pool::{create_pool, health_check, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use nishlen_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres, Transaction};
