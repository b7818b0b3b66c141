//! Master lookup against the identity schema

use async_trait::async_trait;
use nishlen_core::{
    models::{ConfirmationPolicy, Master},
    traits::MasterRepository,
    AppError, AppResult,
};
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of MasterRepository, reading `auth.users`
pub struct PgMasterRepository {
    pool: PgPool,
}

impl PgMasterRepository {
    /// Create a new master repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MasterRepository for PgMasterRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Master>> {
        debug!("Finding master by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, MasterRow>(
            r#"
            SELECT u.id, u.full_name, u.city, u.rules_json,
                   ARRAY(
                       SELECT DISTINCT s.admin_id
                       FROM booking.salon_masters sm
                       JOIN booking.salons s ON s.id = sm.salon_id
                       WHERE sm.master_id = u.id
                   ) AS salon_admins
            FROM auth.users u
            WHERE u.id = $1 AND u.role = 'master'
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding master {}: {}", id, e);
            AppError::Database(format!("Failed to find master: {}", e))
        })?;

        Ok(result.map(Into::into))
    }
}

/// Internal row type for database mapping
#[derive(Debug, sqlx::FromRow)]
struct MasterRow {
    id: Uuid,
    full_name: Option<String>,
    city: Option<String>,
    rules_json: Option<serde_json::Value>,
    salon_admins: Vec<Uuid>,
}

impl From<MasterRow> for Master {
    fn from(row: MasterRow) -> Self {
        Master {
            id: row.id,
            full_name: row.full_name,
            city: row.city,
            policy: ConfirmationPolicy::from_rules_json(row.rules_json.as_ref()),
            salon_admins: row.salon_admins,
        }
    }
}
