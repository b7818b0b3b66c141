//! Service catalog repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nishlen_core::{
    models::{Service, ServiceFilter},
    traits::ServiceRepository,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::violated_foreign_key;

/// PostgreSQL implementation of ServiceRepository
pub struct PgServiceRepository {
    pool: PgPool,
}

impl PgServiceRepository {
    /// Create a new service repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ServiceRepository for PgServiceRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Service>> {
        debug!("Finding service by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, ServiceRow>(
            r#"
            SELECT id, master_id, name, description, price, duration_min, created_at
            FROM booking.services
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding service {}: {}", id, e);
            AppError::Database(format!("Failed to find service: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self, service), fields(master_id = %service.master_id))]
    async fn create(&self, service: &Service) -> AppResult<Service> {
        let row = sqlx::query_as::<sqlx::Postgres, ServiceRow>(
            r#"
            INSERT INTO booking.services (id, master_id, name, description, price, duration_min)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, master_id, name, description, price, duration_min, created_at
            "#,
        )
        .bind(service.id)
        .bind(service.master_id)
        .bind(&service.name)
        .bind(&service.description)
        .bind(service.price)
        .bind(service.duration_min)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if violated_foreign_key(&e).is_some() {
                warn!("Master {} vanished before service insert", service.master_id);
                return AppError::MasterNotFound(service.master_id.to_string());
            }
            error!("Database error creating service: {}", e);
            AppError::Database(format!("Failed to create service: {}", e))
        })?;

        info!("Created service {} '{}'", row.id, row.name);
        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn list(&self, filter: &ServiceFilter) -> AppResult<Vec<Service>> {
        let rows = sqlx::query_as::<sqlx::Postgres, ServiceRow>(
            r#"
            SELECT s.id, s.master_id, s.name, s.description, s.price, s.duration_min, s.created_at
            FROM booking.services s
            JOIN auth.users u ON u.id = s.master_id
            WHERE ($1::uuid IS NULL OR s.master_id = $1)
              AND ($2::text IS NULL OR u.city = $2)
            ORDER BY s.created_at, s.id
            "#,
        )
        .bind(filter.master_id)
        .bind(&filter.city)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing services: {}", e);
            AppError::Database(format!("Failed to list services: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Internal row type for database mapping
#[derive(Debug, sqlx::FromRow)]
struct ServiceRow {
    id: Uuid,
    master_id: Uuid,
    name: String,
    description: Option<String>,
    price: Decimal,
    duration_min: i32,
    created_at: DateTime<Utc>,
}

impl From<ServiceRow> for Service {
    fn from(row: ServiceRow) -> Self {
        Service {
            id: row.id,
            master_id: row.master_id,
            name: row.name,
            description: row.description,
            price: row.price,
            duration_min: row.duration_min,
            created_at: row.created_at,
        }
    }
}
