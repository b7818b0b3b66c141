//! Nishlen booking outbox relay
//!
//! Connects to PostgreSQL, applies the booking schema, and delivers booking
//! events recorded in the outbox to the Redis `booking_events` channel until
//! interrupted.

use anyhow::Context;
use nishlen_cache::{MemoryEventLog, RedisEventLog};
use nishlen_core::traits::{EventPublisher, OutboxRepository};
use nishlen_core::AppConfig;
use nishlen_db::{create_pool, run_migrations, PgOutboxRepository};
use nishlen_services::OutboxRelay;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "nishlen_booking={},nishlen_services={},nishlen_db={},nishlen_cache={},sqlx=warn",
            log_level, log_level, log_level, log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

/// Run the relay until ctrl-c
async fn run_relay<O, E>(outbox: Arc<O>, publisher: Arc<E>, config: &AppConfig)
where
    O: OutboxRepository,
    E: EventPublisher,
{
    let relay = OutboxRelay::new(outbox, publisher)
        .with_batch_size(config.relay.batch_size)
        .with_interval(Duration::from_millis(config.relay.poll_interval_ms));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    relay.run(shutdown_rx).await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    init_tracing();

    info!(
        "Starting Nishlen booking relay v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = AppConfig::load().context("failed to load configuration")?;

    info!("Connecting to database...");
    let pool = create_pool(&config.database.url, Some(config.database.max_connections))
        .await
        .context("failed to connect to database")?;

    if config.database.run_migrations {
        run_migrations(&pool)
            .await
            .context("failed to apply migrations")?;
    }

    let outbox = Arc::new(PgOutboxRepository::new(pool));

    match config.redis.url.as_deref() {
        Some(url) => {
            let log = RedisEventLog::new(url, config.events.clone())
                .await
                .context("failed to connect to Redis")?;
            log.ping().await.context("Redis ping failed")?;
            info!("Publishing booking events to Redis channel {}", config.events.channel);
            run_relay(outbox, Arc::new(log), &config).await;
        }
        None => {
            warn!("No Redis URL configured, events are kept in process only");
            let log = MemoryEventLog::new(config.events.recent_limit);
            run_relay(outbox, Arc::new(log), &config).await;
        }
    }

    info!("Nishlen booking relay stopped");
    Ok(())
}
