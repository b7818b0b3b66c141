//! Slot model
//!
//! A slot is one offerable time window of a master on a given date.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppError, AppResult};

/// Half-open interval overlap test: `[a_start, a_end)` vs `[b_start, b_end)`
#[inline]
pub fn windows_overlap(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start < b_end && a_end > b_start
}

/// Slot entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Unique identifier
    pub id: Uuid,

    /// Owning master
    pub master_id: Uuid,

    /// Calendar date of the window
    pub date: NaiveDate,

    /// Window start (inclusive)
    pub start_time: NaiveTime,

    /// Window end (exclusive)
    pub end_time: NaiveTime,

    /// False while a live booking consumes the slot
    pub is_available: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Slot {
    /// Build an available slot from a validated request
    pub fn from_request(request: &NewSlot) -> Self {
        Self {
            id: Uuid::new_v4(),
            master_id: request.master_id,
            date: request.date,
            start_time: request.start_time,
            end_time: request.end_time,
            is_available: true,
            created_at: Utc::now(),
        }
    }

    /// Check whether this slot's window overlaps `[start, end)`
    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        windows_overlap(self.start_time, self.end_time, start, end)
    }
}

/// Request to publish a new slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSlot {
    pub master_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl NewSlot {
    pub fn new(master_id: Uuid, date: NaiveDate, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            master_id,
            date,
            start_time,
            end_time,
        }
    }

    /// Reject empty or inverted windows
    pub fn validate(&self) -> AppResult<()> {
        if self.end_time <= self.start_time {
            return Err(AppError::Validation(format!(
                "End time {} must be after start time {}",
                self.end_time, self.start_time
            )));
        }
        Ok(())
    }
}
