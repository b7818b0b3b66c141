//! Slot ledger repository implementation
//!
//! Provides PostgreSQL-backed storage for schedule slots. Overlap checks run
//! under a transaction-scoped advisory lock keyed on (master, date), so two
//! concurrent publishes for the same day serialize instead of both passing
//! the check.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use nishlen_core::{
    models::{NewSlot, Slot},
    traits::SlotRepository,
    AppError, AppResult,
};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, error, info, instrument, warn};

use super::violated_foreign_key;
use uuid::Uuid;

const SLOT_COLUMNS: &str = "id, master_id, date, start_time, end_time, is_available, created_at";

/// PostgreSQL implementation of SlotRepository
pub struct PgSlotRepository {
    pool: PgPool,
}

impl PgSlotRepository {
    /// Create a new slot repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Flip an available slot to unavailable on the given connection.
///
/// The conditional update is the single serialization point for competing
/// reservations: of two concurrent callers exactly one sees a returned row.
pub(crate) async fn reserve_slot(conn: &mut PgConnection, id: Uuid) -> AppResult<Slot> {
    let row = sqlx::query_as::<sqlx::Postgres, SlotRow>(&format!(
        r#"
        UPDATE booking.schedules
        SET is_available = FALSE
        WHERE id = $1 AND is_available = TRUE
        RETURNING {}
        "#,
        SLOT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| {
        error!("Database error reserving slot {}: {}", id, e);
        AppError::Database(format!("Failed to reserve slot: {}", e))
    })?;

    if let Some(row) = row {
        return Ok(row.into());
    }

    let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM booking.schedules WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            error!("Database error checking slot {}: {}", id, e);
            AppError::Database(format!("Failed to check slot: {}", e))
        })?;

    match exists {
        Some(_) => Err(AppError::SlotUnavailable(id.to_string())),
        None => Err(AppError::SlotNotFound(id.to_string())),
    }
}

/// Flip a slot back to available on the given connection; idempotent
pub(crate) async fn release_slot(conn: &mut PgConnection, id: Uuid) -> AppResult<Slot> {
    let row = sqlx::query_as::<sqlx::Postgres, SlotRow>(&format!(
        r#"
        UPDATE booking.schedules
        SET is_available = TRUE
        WHERE id = $1
        RETURNING {}
        "#,
        SLOT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| {
        error!("Database error releasing slot {}: {}", id, e);
        AppError::Database(format!("Failed to release slot: {}", e))
    })?;

    row.map(Into::into)
        .ok_or_else(|| AppError::SlotNotFound(id.to_string()))
}

#[async_trait]
impl SlotRepository for PgSlotRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Slot>> {
        debug!("Finding slot by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, SlotRow>(&format!(
            "SELECT {} FROM booking.schedules WHERE id = $1",
            SLOT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding slot {}: {}", id, e);
            AppError::Database(format!("Failed to find slot: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self, request), fields(master_id = %request.master_id, date = %request.date))]
    async fn publish(&self, request: &NewSlot) -> AppResult<Slot> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            AppError::Transaction(format!("Failed to begin transaction: {}", e))
        })?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("schedule:{}:{}", request.master_id, request.date))
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to lock schedule day: {}", e);
                AppError::Database(format!("Failed to lock schedule day: {}", e))
            })?;

        let clash: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM booking.schedules
            WHERE master_id = $1
              AND date = $2
              AND start_time < $4
              AND end_time > $3
            LIMIT 1
            "#,
        )
        .bind(request.master_id)
        .bind(request.date)
        .bind(request.start_time)
        .bind(request.end_time)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error checking slot overlap: {}", e);
            AppError::Database(format!("Failed to check slot overlap: {}", e))
        })?;

        if let Some((existing,)) = clash {
            debug!("Slot request overlaps slot {}", existing);
            return Err(AppError::SlotOverlap(existing.to_string()));
        }

        let slot = Slot::from_request(request);
        let row = sqlx::query_as::<sqlx::Postgres, SlotRow>(&format!(
            r#"
            INSERT INTO booking.schedules (id, master_id, date, start_time, end_time, is_available)
            VALUES ($1, $2, $3, $4, $5, TRUE)
            RETURNING {}
            "#,
            SLOT_COLUMNS
        ))
        .bind(slot.id)
        .bind(slot.master_id)
        .bind(slot.date)
        .bind(slot.start_time)
        .bind(slot.end_time)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if violated_foreign_key(&e).is_some() {
                warn!("Master {} vanished before slot insert", slot.master_id);
                return AppError::MasterNotFound(slot.master_id.to_string());
            }
            error!("Database error inserting slot: {}", e);
            AppError::Database(format!("Failed to insert slot: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit slot publish: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!("Published slot {}", row.id);
        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn list_available(&self, master_id: Uuid, date: NaiveDate) -> AppResult<Vec<Slot>> {
        let rows = sqlx::query_as::<sqlx::Postgres, SlotRow>(&format!(
            r#"
            SELECT {}
            FROM booking.schedules
            WHERE master_id = $1 AND date = $2 AND is_available = TRUE
            ORDER BY start_time
            "#,
            SLOT_COLUMNS
        ))
        .bind(master_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing slots: {}", e);
            AppError::Database(format!("Failed to list slots: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn reserve(&self, id: Uuid) -> AppResult<Slot> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            error!("Failed to acquire connection: {}", e);
            AppError::Pool(format!("Failed to acquire connection: {}", e))
        })?;
        reserve_slot(&mut conn, id).await
    }

    #[instrument(skip(self))]
    async fn release(&self, id: Uuid) -> AppResult<Slot> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            error!("Failed to acquire connection: {}", e);
            AppError::Pool(format!("Failed to acquire connection: {}", e))
        })?;
        release_slot(&mut conn, id).await
    }
}

/// Internal row type for database mapping
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SlotRow {
    id: Uuid,
    master_id: Uuid,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    is_available: bool,
    created_at: DateTime<Utc>,
}

impl From<SlotRow> for Slot {
    fn from(row: SlotRow) -> Self {
        Slot {
            id: row.id,
            master_id: row.master_id,
            date: row.date,
            start_time: row.start_time,
            end_time: row.end_time,
            is_available: row.is_available,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::test_support::{seed_user, test_pool};
    use futures::future::join_all;
    use std::sync::Arc;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_publish_rejects_overlap() {
        let pool = test_pool().await;
        let master = seed_user(&pool, "master", None).await;
        let repo = PgSlotRepository::new(pool);
        let date = NaiveDate::from_ymd_opt(2030, 5, 1).unwrap();

        repo.publish(&NewSlot::new(master, date, t(10, 0), t(11, 0)))
            .await
            .unwrap();
        let err = repo
            .publish(&NewSlot::new(master, date, t(10, 30), t(11, 30)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotOverlap(_)));

        // Touching windows are fine
        repo.publish(&NewSlot::new(master, date, t(11, 0), t(12, 0)))
            .await
            .unwrap();

        let slots = repo.list_available(master, date).await.unwrap();
        assert_eq!(slots.len(), 2);
        assert!(slots[0].start_time < slots[1].start_time);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_reserve_and_release() {
        let pool = test_pool().await;
        let master = seed_user(&pool, "master", None).await;
        let repo = PgSlotRepository::new(pool);
        let date = NaiveDate::from_ymd_opt(2030, 5, 2).unwrap();

        let slot = repo
            .publish(&NewSlot::new(master, date, t(9, 0), t(10, 0)))
            .await
            .unwrap();

        assert!(!repo.reserve(slot.id).await.unwrap().is_available);
        assert!(matches!(
            repo.reserve(slot.id).await.unwrap_err(),
            AppError::SlotUnavailable(_)
        ));
        assert!(repo.release(slot.id).await.unwrap().is_available);
        assert!(repo.release(slot.id).await.unwrap().is_available);
        assert!(matches!(
            repo.reserve(Uuid::new_v4()).await.unwrap_err(),
            AppError::SlotNotFound(_)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore] // Requires database
    async fn test_concurrent_overlapping_publish_single_winner() {
        let pool = test_pool().await;
        let master = seed_user(&pool, "master", None).await;
        let repo = Arc::new(PgSlotRepository::new(pool));
        let date = NaiveDate::from_ymd_opt(2030, 5, 3).unwrap();

        let attempts: Vec<_> = (0..8u32)
            .map(|i| {
                let repo = repo.clone();
                let request = NewSlot::new(master, date, t(10, i), t(11, i));
                tokio::spawn(async move { repo.publish(&request).await })
            })
            .collect();

        let results: Vec<_> = join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for result in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(result.is_conflict(), "unexpected error {:?}", result);
        }
        assert_eq!(repo.list_available(master, date).await.unwrap().len(), 1);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_publish_for_missing_master_is_not_found() {
        let pool = test_pool().await;
        let repo = PgSlotRepository::new(pool);
        let date = NaiveDate::from_ymd_opt(2030, 5, 4).unwrap();

        let err = repo
            .publish(&NewSlot::new(Uuid::new_v4(), date, t(9, 0), t(10, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MasterNotFound(_)));
    }
}
