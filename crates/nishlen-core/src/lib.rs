//! Nishlen Booking Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the Nishlen booking system. It includes:
//!
//! - Domain models (Slot, Booking, Service, Master, BookingEvent)
//! - Repository and notifier traits implemented by the storage crates
//! - The confirmation rules engine and per-operation authorization policy
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod policy;
pub mod rules;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
