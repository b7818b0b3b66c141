//! Repository implementations
//!
//! Concrete implementations of the repository traits defined in
//! nishlen-core: sqlx-backed PostgreSQL repositories plus the in-process
//! `MemoryStore`.

pub mod booking_repo;
pub mod master_repo;
pub mod memory;
pub mod outbox_repo;
pub mod service_repo;
pub mod slot_repo;

pub use booking_repo::PgBookingRepository;
pub use master_repo::PgMasterRepository;
pub use memory::MemoryStore;
pub use outbox_repo::PgOutboxRepository;
pub use service_repo::PgServiceRepository;
pub use slot_repo::PgSlotRepository;

/// SQLSTATE `foreign_key_violation`
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Constraint name when `err` is a foreign-key violation.
///
/// Inserts reference rows the caller checked earlier; a concurrent delete
/// between that check and the insert surfaces here.
pub(crate) fn violated_foreign_key(err: &sqlx::Error) -> Option<&str> {
    let db = err.as_database_error()?;
    if db.code().as_deref() != Some(FOREIGN_KEY_VIOLATION) {
        return None;
    }
    Some(db.constraint().unwrap_or_default())
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{NaiveDate, NaiveTime};
    use sqlx::PgPool;
    use uuid::Uuid;

    pub async fn test_pool() -> PgPool {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/nishlen_test".to_string());
        let pool = crate::create_pool(&database_url, Some(5)).await.unwrap();
        crate::run_migrations(&pool).await.unwrap();
        pool
    }

    pub async fn seed_user(pool: &PgPool, role: &str, city: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO auth.users (id, role, full_name, city) VALUES ($1, $2, $3, $4)")
            .bind(id)
            .bind(role)
            .bind(format!("Test {}", role))
            .bind(city)
            .execute(pool)
            .await
            .unwrap();
        id
    }

    /// A salon administered by `admin` with `master` on its staff
    pub async fn seed_salon(pool: &PgPool, admin: Uuid, master: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO booking.salons (id, name, admin_id) VALUES ($1, 'Test salon', $2)")
            .bind(id)
            .bind(admin)
            .execute(pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO booking.salon_masters (id, salon_id, master_id) VALUES ($1, $2, $3)")
            .bind(Uuid::new_v4())
            .bind(id)
            .bind(master)
            .execute(pool)
            .await
            .unwrap();
        id
    }

    pub async fn seed_service(pool: &PgPool, master: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO booking.services (id, master_id, name) VALUES ($1, $2, 'Test service')")
            .bind(id)
            .bind(master)
            .execute(pool)
            .await
            .unwrap();
        id
    }

    pub async fn seed_slot(pool: &PgPool, master: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO booking.schedules (id, master_id, date, start_time, end_time) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(master)
        .bind(NaiveDate::from_ymd_opt(2030, 6, 1).unwrap())
        .bind(NaiveTime::from_hms_opt(10, 0, 0).unwrap())
        .bind(NaiveTime::from_hms_opt(11, 0, 0).unwrap())
        .execute(pool)
        .await
        .unwrap();
        id
    }
}
