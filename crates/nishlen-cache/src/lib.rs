//! Redis event notifier for Nishlen booking
//!
//! Delivers booking lifecycle events to external subscribers and keeps a
//! bounded log of the most recent ones.
//!
//! # Features
//!
//! - Connection pooling via Redis ConnectionManager
//! - Pub/sub delivery on a configurable channel
//! - A capped recent-events list, trimmed on every append
//! - An in-process implementation for tests and database-less runs
//!
//! # Example
//!
//! ```no_run
//! use nishlen_cache::RedisEventLog;
//! use nishlen_core::config::EventsConfig;
//! use nishlen_core::traits::EventPublisher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let log = RedisEventLog::new("redis://127.0.0.1:6379", EventsConfig::default()).await?;
//!     let recent = log.recent(10).await?;
//!     println!("{} recent events", recent.len());
//!     Ok(())
//! }
//! ```

pub mod memory;

pub use memory::MemoryEventLog;

use async_trait::async_trait;
use nishlen_core::config::EventsConfig;
use nishlen_core::error::AppError;
use nishlen_core::models::BookingEvent;
use nishlen_core::traits::EventPublisher;
use redis::{aio::ConnectionManager, Client, RedisError};
use tracing::{debug, error, instrument, warn};

/// Redis-backed event channel and recent-events list
///
/// Wraps a Redis ConnectionManager; clones share the multiplexed connection.
#[derive(Clone)]
pub struct RedisEventLog {
    manager: ConnectionManager,
    config: EventsConfig,
}

impl RedisEventLog {
    /// Connect to Redis
    ///
    /// # Errors
    ///
    /// Returns `AppError::CacheConnection` if the connection fails
    pub async fn new(url: &str, config: EventsConfig) -> Result<Self, AppError> {
        debug!("Connecting to Redis at {}", url);

        let client = Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            AppError::CacheConnection(format!("Invalid Redis URL: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to establish Redis connection: {}", e);
            AppError::CacheConnection(format!("Connection failed: {}", e))
        })?;

        debug!("Redis connection established successfully");
        Ok(Self { manager, config })
    }

    /// Ping the Redis server to check connectivity
    pub async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Redis ping failed: {}", e);
                AppError::Cache(format!("Ping failed: {}", e))
            })?;
        Ok(())
    }

    /// Convert RedisError to AppError
    fn map_redis_error(err: RedisError) -> AppError {
        match err.kind() {
            redis::ErrorKind::IoError => {
                error!("Redis I/O error: {}", err);
                AppError::CacheConnection(format!("I/O error: {}", err))
            }
            redis::ErrorKind::TypeError => {
                warn!("Redis type error: {}", err);
                AppError::Cache(format!("Type mismatch: {}", err))
            }
            _ => {
                error!("Redis error: {}", err);
                AppError::Cache(err.to_string())
            }
        }
    }
}

#[async_trait]
impl EventPublisher for RedisEventLog {
    /// Publish on the channel, then push onto the capped list.
    ///
    /// Both commands go out in one MULTI/EXEC block so the list never holds
    /// an event that was not published.
    #[instrument(skip(self, event), fields(kind = %event.kind, booking_id = %event.booking_id))]
    async fn publish(&self, event: &BookingEvent) -> Result<(), AppError> {
        let payload = serde_json::to_string(event)?;
        let cap = self.config.recent_limit.max(1) as isize;
        let mut conn = self.manager.clone();

        let _: () = redis::pipe()
            .atomic()
            .publish(&self.config.channel, &payload)
            .ignore()
            .lpush(&self.config.list_key, &payload)
            .ignore()
            .ltrim(&self.config.list_key, 0, cap - 1)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(Self::map_redis_error)?;

        debug!("Published {} to {}", payload, self.config.channel);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn recent(&self, limit: usize) -> Result<Vec<BookingEvent>, AppError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.manager.clone();
        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(&self.config.list_key)
            .arg(0)
            .arg(limit as isize - 1)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_redis_error)?;

        Ok(raw
            .iter()
            .filter_map(|json| match serde_json::from_str::<BookingEvent>(json) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!("Skipping malformed event in {}: {}", self.config.list_key, e);
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nishlen_core::models::{BookingStatus, EventKind};
    use uuid::Uuid;

    async fn test_log(list_key: &str) -> RedisEventLog {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let config = EventsConfig {
            channel: format!("{}_channel", list_key),
            list_key: list_key.to_string(),
            recent_limit: 3,
        };
        RedisEventLog::new(&url, config).await.unwrap()
    }

    fn event(kind: EventKind, status: BookingStatus) -> BookingEvent {
        BookingEvent {
            kind,
            booking_id: Uuid::new_v4(),
            status,
        }
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_recent_is_capped_and_newest_first() {
        let log = test_log(&format!("test_events_{}", Uuid::new_v4())).await;
        log.ping().await.unwrap();

        let mut sent = Vec::new();
        for _ in 0..5 {
            let e = event(EventKind::BookingCreated, BookingStatus::Pending);
            log.publish(&e).await.unwrap();
            sent.push(e);
        }

        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0], sent[4]);
        assert_eq!(recent[2], sent[2]);

        assert_eq!(log.recent(1).await.unwrap(), vec![sent[4].clone()]);
        assert!(log.recent(0).await.unwrap().is_empty());
    }
}
