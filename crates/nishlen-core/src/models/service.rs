//! Service catalog model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{AppError, AppResult};

/// Sellable offering owned by one master
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub master_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub duration_min: i32,
    pub created_at: DateTime<Utc>,
}

impl Service {
    pub fn from_request(master_id: Uuid, request: &NewService) -> Self {
        Self {
            id: Uuid::new_v4(),
            master_id,
            name: request.name.trim().to_string(),
            description: request.description.clone(),
            price: request.price,
            duration_min: request.duration_min,
            created_at: Utc::now(),
        }
    }
}

/// Service creation request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewService {
    #[validate(length(min = 1, max = 255, message = "Service name is required"))]
    pub name: String,

    pub description: Option<String>,

    #[serde(default)]
    pub price: Decimal,

    #[serde(default = "default_duration")]
    #[validate(range(min = 1, max = 1440))]
    pub duration_min: i32,
}

fn default_duration() -> i32 {
    30
}

impl NewService {
    /// Run field validators plus the checks they cannot express
    pub fn check(&self) -> AppResult<()> {
        self.validate()?;
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("Service name is required".to_string()));
        }
        if self.price < Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Price must not be negative, got {}",
                self.price
            )));
        }
        Ok(())
    }
}

/// Catalog filter; both fields optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFilter {
    pub master_id: Option<Uuid>,
    pub city: Option<String>,
}

impl ServiceFilter {
    pub fn by_master(master_id: Uuid) -> Self {
        Self {
            master_id: Some(master_id),
            city: None,
        }
    }

    pub fn by_city(city: &str) -> Self {
        Self {
            master_id: None,
            city: Some(city.to_string()),
        }
    }
}
