//! Unified error handling for Nishlen booking
//!
//! Every failure a caller can observe maps to one variant here. The four
//! domain kinds (validation, not found, conflict, authorization) each carry a
//! stable error code and HTTP status so a client can branch on
//! "try another slot" vs "not allowed" vs "not found" vs "bad input".

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Event Log Errors ====================
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Cache connection failed: {0}")]
    CacheConnection(String),

    // ==================== Authorization Errors ====================
    #[error("Not authorized: {0}")]
    Forbidden(String),

    // ==================== Business Logic Errors ====================
    #[error("Slot not found: {0}")]
    SlotNotFound(String),

    #[error("Slot not available: {0}")]
    SlotUnavailable(String),

    #[error("Slot overlaps with existing slot {0}")]
    SlotOverlap(String),

    #[error("Booking not found: {0}")]
    BookingNotFound(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Master not found: {0}")]
    MasterNotFound(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    // ==================== Resource Errors ====================
    #[error("Conflict: {0}")]
    Conflict(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse failure kind a caller branches on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Authorization,
    Infrastructure,
}

impl AppError {
    /// Returns the coarse kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,

            AppError::SlotNotFound(_)
            | AppError::BookingNotFound(_)
            | AppError::ServiceNotFound(_)
            | AppError::MasterNotFound(_) => ErrorKind::NotFound,

            AppError::SlotUnavailable(_) | AppError::SlotOverlap(_) | AppError::Conflict(_) => {
                ErrorKind::Conflict
            }

            AppError::Forbidden(_) => ErrorKind::Authorization,

            _ => ErrorKind::Infrastructure,
        }
    }

    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::Cache(_) => "cache_error",
            AppError::CacheConnection(_) => "cache_connection_error",
            AppError::Forbidden(_) => "forbidden",
            AppError::SlotNotFound(_) => "slot_not_found",
            AppError::SlotUnavailable(_) => "slot_unavailable",
            AppError::SlotOverlap(_) => "slot_overlap",
            AppError::BookingNotFound(_) => "booking_not_found",
            AppError::ServiceNotFound(_) => "service_not_found",
            AppError::MasterNotFound(_) => "master_not_found",
            AppError::Validation(_) => "validation_error",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_forbidden(&self) -> bool {
        self.kind() == ErrorKind::Authorization
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
