//! Booking repository implementation
//!
//! Provides PostgreSQL-backed storage for bookings. Creation and every
//! status transition run in one transaction together with the slot flip and
//! the outbox event they imply.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nishlen_core::{
    models::{Booking, BookingEvent, BookingStatus, EventKind, NewBooking},
    traits::BookingRepository,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::outbox_repo::enqueue_event;
use super::slot_repo::{release_slot, reserve_slot};
use super::violated_foreign_key;

const BOOKING_COLUMNS: &str = r#"
    id, client_id, requested_by, master_id, service_id, schedule_id, status, notes,
    prepayment_amount, created_at, confirmed_at, completed_at
"#;

/// Not-found error for a violated `booking.bookings` foreign key
fn missing_reference(constraint: &str, booking: &Booking) -> Option<AppError> {
    match constraint {
        "bookings_master_id_fkey" => Some(AppError::MasterNotFound(booking.master_id.to_string())),
        "bookings_service_id_fkey" => {
            Some(AppError::ServiceNotFound(booking.service_id.to_string()))
        }
        "bookings_schedule_id_fkey" => Some(AppError::SlotNotFound(booking.slot_id.to_string())),
        _ => None,
    }
}

/// PostgreSQL implementation of BookingRepository
pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    /// Create a new booking repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Parse booking status from string
    fn parse_status(s: &str) -> BookingStatus {
        BookingStatus::from_str(s).unwrap_or_else(|| {
            warn!("Unknown booking status '{}', treating as pending", s);
            BookingStatus::Pending
        })
    }

    async fn lock_booking(conn: &mut PgConnection, id: Uuid) -> AppResult<Option<BookingRow>> {
        sqlx::query_as::<sqlx::Postgres, BookingRow>(&format!(
            "SELECT {} FROM booking.bookings WHERE id = $1 FOR UPDATE",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            error!("Database error locking booking {}: {}", id, e);
            AppError::Database(format!("Failed to lock booking: {}", e))
        })
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Booking>> {
        debug!("Finding booking by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, BookingRow>(&format!(
            "SELECT {} FROM booking.bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding booking {}: {}", id, e);
            AppError::Database(format!("Failed to find booking: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self, request), fields(slot_id = %request.slot_id, status = %request.status))]
    async fn create_reserving_slot(&self, request: &NewBooking) -> AppResult<Booking> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            AppError::Transaction(format!("Failed to begin transaction: {}", e))
        })?;

        reserve_slot(&mut tx, request.slot_id).await?;

        let booking = Booking::from_request(request);
        let row = sqlx::query_as::<sqlx::Postgres, BookingRow>(&format!(
            r#"
            INSERT INTO booking.bookings (
                id, client_id, requested_by, master_id, service_id, schedule_id,
                status, notes, prepayment_amount
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(booking.id)
        .bind(booking.client_id)
        .bind(booking.requested_by)
        .bind(booking.master_id)
        .bind(booking.service_id)
        .bind(booking.slot_id)
        .bind(booking.status.as_str())
        .bind(&booking.notes)
        .bind(booking.prepayment_amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            let missing = violated_foreign_key(&e).and_then(|c| missing_reference(c, &booking));
            if let Some(err) = missing {
                warn!("Booking {} references a vanished row: {}", booking.id, err);
                return err;
            }
            error!("Database error inserting booking: {}", e);
            AppError::Database(format!("Failed to insert booking: {}", e))
        })?;

        let booking: Booking = row.into();
        enqueue_event(&mut tx, &BookingEvent::created(&booking)).await?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit booking {}: {}", booking.id, e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!(
            "Created booking {} for slot {} as {}",
            booking.id, booking.slot_id, booking.status
        );
        Ok(booking)
    }

    #[instrument(skip(self))]
    async fn transition(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> AppResult<Booking> {
        if !from.can_transition_to(to) {
            return Err(AppError::Conflict(format!(
                "illegal transition {} -> {}",
                from, to
            )));
        }

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            AppError::Transaction(format!("Failed to begin transaction: {}", e))
        })?;

        let mut booking: Booking = Self::lock_booking(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::BookingNotFound(id.to_string()))?
            .into();

        if booking.status != from {
            warn!(
                "Booking {} moved to {} concurrently, expected {}",
                id, booking.status, from
            );
            return Err(AppError::Conflict(format!(
                "booking {} is {}, expected {}",
                id, booking.status, from
            )));
        }

        booking.apply_status(to, Utc::now());

        let row = sqlx::query_as::<sqlx::Postgres, BookingRow>(&format!(
            r#"
            UPDATE booking.bookings
            SET status = $2, confirmed_at = $3, completed_at = $4
            WHERE id = $1
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(id)
        .bind(booking.status.as_str())
        .bind(booking.confirmed_at)
        .bind(booking.completed_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error updating booking {}: {}", id, e);
            AppError::Database(format!("Failed to update booking: {}", e))
        })?;

        if from.releases_slot(to) {
            release_slot(&mut tx, booking.slot_id).await?;
        }

        let booking: Booking = row.into();
        if let Some(kind) = EventKind::for_transition(to) {
            enqueue_event(&mut tx, &BookingEvent::new(kind, &booking)).await?;
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transition of booking {}: {}", id, e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!("Booking {} moved {} -> {}", id, from, to);
        Ok(booking)
    }

    #[instrument(skip(self))]
    async fn list_by_client(&self, client_id: Uuid) -> AppResult<Vec<Booking>> {
        let rows = sqlx::query_as::<sqlx::Postgres, BookingRow>(&format!(
            r#"
            SELECT {}
            FROM booking.bookings
            WHERE client_id = $1
            ORDER BY created_at DESC, id
            "#,
            BOOKING_COLUMNS
        ))
        .bind(client_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing bookings of {}: {}", client_id, e);
            AppError::Database(format!("Failed to list bookings: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Internal row type for database mapping
#[derive(Debug, sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    client_id: Option<Uuid>,
    requested_by: Uuid,
    master_id: Uuid,
    service_id: Uuid,
    schedule_id: Uuid,
    status: String,
    notes: Option<String>,
    prepayment_amount: Decimal,
    created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Booking {
            id: row.id,
            client_id: row.client_id,
            requested_by: row.requested_by,
            master_id: row.master_id,
            service_id: row.service_id,
            slot_id: row.schedule_id,
            status: PgBookingRepository::parse_status(&row.status),
            notes: row.notes,
            prepayment_amount: row.prepayment_amount,
            created_at: row.created_at,
            confirmed_at: row.confirmed_at,
            completed_at: row.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::test_support::{seed_service, seed_slot, seed_user, test_pool};
    use crate::repositories::PgSlotRepository;
    use nishlen_core::traits::SlotRepository;

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_create_then_cancel_pending_releases_slot() {
        let pool = test_pool().await;
        let master = seed_user(&pool, "master", None).await;
        let client = seed_user(&pool, "client", None).await;
        let service = seed_service(&pool, master).await;
        let slot = seed_slot(&pool, master).await;

        let repo = PgBookingRepository::new(pool.clone());
        let slots = PgSlotRepository::new(pool);

        let booking = repo
            .create_reserving_slot(&NewBooking {
                client_id: Some(client),
                requested_by: client,
                master_id: master,
                service_id: service,
                slot_id: slot,
                status: BookingStatus::Pending,
                notes: Some("first visit".to_string()),
            })
            .await
            .unwrap();
        assert!(!slots.find_by_id(slot).await.unwrap().unwrap().is_available);

        let cancelled = repo
            .transition(booking.id, BookingStatus::Pending, BookingStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert!(slots.find_by_id(slot).await.unwrap().unwrap().is_available);

        let stale = repo
            .transition(booking.id, BookingStatus::Pending, BookingStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(stale.is_conflict());
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_second_booking_on_same_slot_fails() {
        let pool = test_pool().await;
        let master = seed_user(&pool, "master", None).await;
        let service = seed_service(&pool, master).await;
        let slot = seed_slot(&pool, master).await;
        let repo = PgBookingRepository::new(pool);

        let request = NewBooking {
            client_id: None,
            requested_by: Uuid::new_v4(),
            master_id: master,
            service_id: service,
            slot_id: slot,
            status: BookingStatus::Pending,
            notes: None,
        };
        repo.create_reserving_slot(&request).await.unwrap();
        let err = repo.create_reserving_slot(&request).await.unwrap_err();
        assert!(matches!(err, AppError::SlotUnavailable(_)));
    }

    #[test]
    fn test_missing_reference_maps_foreign_keys() {
        let booking = Booking::from_request(&NewBooking {
            client_id: None,
            requested_by: Uuid::new_v4(),
            master_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            slot_id: Uuid::new_v4(),
            status: BookingStatus::Pending,
            notes: None,
        });

        assert!(matches!(
            missing_reference("bookings_master_id_fkey", &booking),
            Some(AppError::MasterNotFound(id)) if id == booking.master_id.to_string()
        ));
        assert!(matches!(
            missing_reference("bookings_service_id_fkey", &booking),
            Some(AppError::ServiceNotFound(id)) if id == booking.service_id.to_string()
        ));
        assert!(matches!(
            missing_reference("bookings_schedule_id_fkey", &booking),
            Some(AppError::SlotNotFound(_))
        ));
        assert!(missing_reference("bookings_client_id_fkey", &booking).is_none());
        assert!(missing_reference("", &booking).is_none());
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_vanished_service_is_not_found_and_slot_stays_free() {
        let pool = test_pool().await;
        let master = seed_user(&pool, "master", None).await;
        let slot = seed_slot(&pool, master).await;
        let repo = PgBookingRepository::new(pool.clone());

        let err = repo
            .create_reserving_slot(&NewBooking {
                client_id: None,
                requested_by: Uuid::new_v4(),
                master_id: master,
                service_id: Uuid::new_v4(),
                slot_id: slot,
                status: BookingStatus::Pending,
                notes: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ServiceNotFound(_)));

        // The reservation rolled back with the failed insert
        let slots = PgSlotRepository::new(pool);
        assert!(slots.find_by_id(slot).await.unwrap().unwrap().is_available);
    }
}
