//! Application configuration
//!
//! Centralized configuration management using the `config` crate.
//! Values come from built-in defaults, optional `config/` files and
//! `NISHLEN__`-prefixed environment variables, in that order.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Run embedded migrations on startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_run_migrations() -> bool {
    true
}

/// Redis configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    /// Redis connection URL; when absent events stay in the in-process log
    pub url: Option<String>,
}

/// Booking event stream configuration
#[derive(Debug, Deserialize, Clone)]
pub struct EventsConfig {
    /// Pub/sub channel subscribers listen on
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Key of the bounded recent-events list
    #[serde(default = "default_list_key")]
    pub list_key: String,

    /// Number of events kept in the recent-events list
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

fn default_channel() -> String {
    "booking_events".to_string()
}

fn default_list_key() -> String {
    "booking_events_list".to_string()
}

fn default_recent_limit() -> usize {
    10
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            list_key: default_list_key(),
            recent_limit: default_recent_limit(),
        }
    }
}

/// Outbox relay configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    /// Delay between outbox polls in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Maximum events delivered per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_poll_interval() -> u64 {
    500
}

fn default_batch_size() -> usize {
    100
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            batch_size: default_batch_size(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("database.max_connections", 10)?
            .set_default("database.run_migrations", true)?
            .set_default("events.channel", default_channel())?
            .set_default("events.list_key", default_list_key())?
            .set_default("events.recent_limit", default_recent_limit() as i64)?
            .set_default("relay.poll_interval_ms", default_poll_interval() as i64)?
            .set_default("relay.batch_size", default_batch_size() as i64)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("NISHLEN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app: AppConfig = config.try_deserialize()?;

        // Legacy single-variable deployments
        if app.redis.url.is_none() {
            app.redis.url = env::var("REDIS_URL").ok();
        }

        Ok(app)
    }
}
