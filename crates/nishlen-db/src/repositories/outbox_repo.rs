//! Event outbox repository implementation
//!
//! Booking events are written to `booking.event_outbox` inside the same
//! transaction as the state change that caused them. The relay drains the
//! table towards subscribers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nishlen_core::{
    models::{BookingEvent, BookingStatus, EventKind, OutboxEntry},
    traits::OutboxRepository,
    AppError, AppResult,
};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

/// PostgreSQL implementation of OutboxRepository
pub struct PgOutboxRepository {
    pool: PgPool,
}

impl PgOutboxRepository {
    /// Create a new outbox repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Set rows aside for inspection; they are never fetched again
    async fn discard(&self, ids: &[i64]) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE booking.event_outbox
            SET discarded_at = NOW(), last_error = 'undecodable event'
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error discarding outbox rows: {}", e);
            AppError::Database(format!("Failed to discard outbox rows: {}", e))
        })?;

        warn!("Discarded {} undecodable outbox rows: {:?}", ids.len(), ids);
        Ok(())
    }
}

/// Append an event to the outbox on the given connection
pub(crate) async fn enqueue_event(conn: &mut PgConnection, event: &BookingEvent) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO booking.event_outbox (event_kind, booking_id, status)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(event.kind.as_str())
    .bind(event.booking_id)
    .bind(event.status.as_str())
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        error!("Database error enqueuing {} event: {}", event.kind, e);
        AppError::Database(format!("Failed to enqueue event: {}", e))
    })?;

    debug!("Enqueued {} for booking {}", event.kind, event.booking_id);
    Ok(())
}

#[async_trait]
impl OutboxRepository for PgOutboxRepository {
    #[instrument(skip(self))]
    async fn fetch_pending(&self, limit: usize) -> AppResult<Vec<OutboxEntry>> {
        let rows = sqlx::query_as::<sqlx::Postgres, OutboxRow>(
            r#"
            SELECT id, event_kind, booking_id, status, created_at, delivered_at, attempts
            FROM booking.event_outbox
            WHERE delivered_at IS NULL AND discarded_at IS NULL
            ORDER BY id
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error fetching outbox: {}", e);
            AppError::Database(format!("Failed to fetch outbox: {}", e))
        })?;

        let mut entries = Vec::with_capacity(rows.len());
        let mut undecodable = Vec::new();
        for row in rows {
            match row.into_entry() {
                Ok(entry) => entries.push(entry),
                Err(id) => undecodable.push(id),
            }
        }

        // Undecodable rows leave the pending window, or they would fill it
        // on every poll
        if !undecodable.is_empty() {
            self.discard(&undecodable).await?;
        }

        Ok(entries)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn mark_delivered(&self, ids: &[i64]) -> AppResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE booking.event_outbox
            SET delivered_at = NOW()
            WHERE id = ANY($1) AND delivered_at IS NULL
            "#,
        )
        .bind(ids)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error marking outbox delivered: {}", e);
            AppError::Database(format!("Failed to mark outbox delivered: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn record_failure(&self, id: i64, reason: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE booking.event_outbox
            SET attempts = attempts + 1, last_error = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error recording outbox failure {}: {}", id, e);
            AppError::Database(format!("Failed to record outbox failure: {}", e))
        })?;

        Ok(())
    }
}

/// Internal row type for database mapping
#[derive(Debug, sqlx::FromRow)]
struct OutboxRow {
    id: i64,
    event_kind: String,
    booking_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
    attempts: i32,
}

impl OutboxRow {
    /// Decode the row, or hand back its id when kind or status is unknown
    fn into_entry(self) -> Result<OutboxEntry, i64> {
        let kind = EventKind::from_str(&self.event_kind);
        let status = BookingStatus::from_str(&self.status);
        match (kind, status) {
            (Some(kind), Some(status)) => Ok(OutboxEntry {
                id: self.id,
                event: BookingEvent {
                    kind,
                    booking_id: self.booking_id,
                    status,
                },
                created_at: self.created_at,
                delivered_at: self.delivered_at,
                attempts: self.attempts,
            }),
            _ => {
                warn!(
                    "Outbox row {} has kind '{}' status '{}'",
                    self.id, self.event_kind, self.status
                );
                Err(self.id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::test_support::test_pool;

    fn row(id: i64, kind: &str, status: &str) -> OutboxRow {
        OutboxRow {
            id,
            event_kind: kind.to_string(),
            booking_id: Uuid::new_v4(),
            status: status.to_string(),
            created_at: Utc::now(),
            delivered_at: None,
            attempts: 0,
        }
    }

    #[test]
    fn test_into_entry_rejects_unknown_values() {
        let entry = row(1, "booking_created", "pending").into_entry().unwrap();
        assert_eq!(entry.event.kind, EventKind::BookingCreated);
        assert_eq!(entry.event.status, BookingStatus::Pending);

        assert_eq!(row(2, "booking_exploded", "pending").into_entry().unwrap_err(), 2);
        assert_eq!(row(3, "booking_created", "lost").into_entry().unwrap_err(), 3);
    }

    async fn insert_raw(pool: &PgPool, kind: &str, status: &str) -> i64 {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO booking.event_outbox (event_kind, booking_id, status) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(kind)
        .bind(Uuid::new_v4())
        .bind(status)
        .fetch_one(pool)
        .await
        .unwrap();
        id
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_undecodable_row_does_not_block_later_rows() {
        let pool = test_pool().await;
        let repo = PgOutboxRepository::new(pool.clone());

        let bad = insert_raw(&pool, "booking_exploded", "pending").await;
        let good = insert_raw(&pool, "booking_created", "pending").await;

        // Single-row windows must still advance past the bad row
        let mut seen = Vec::new();
        for _ in 0..1000 {
            let window = repo.fetch_pending(1).await.unwrap();
            let ids: Vec<i64> = window.iter().map(|e| e.id).collect();
            repo.mark_delivered(&ids).await.unwrap();
            seen.extend(ids);
            if seen.contains(&good) {
                break;
            }
        }
        assert!(seen.contains(&good));
        assert!(!seen.contains(&bad));

        let (discarded, last_error): (Option<DateTime<Utc>>, Option<String>) = sqlx::query_as(
            "SELECT discarded_at, last_error FROM booking.event_outbox WHERE id = $1",
        )
        .bind(bad)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(discarded.is_some());
        assert_eq!(last_error.as_deref(), Some("undecodable event"));
    }
}
