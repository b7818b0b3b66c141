//! Outbox relay
//!
//! Drains undelivered events from the outbox in creation order and hands
//! them to the publisher. A publisher failure stops the batch at the failed
//! entry, which stays pending for the next tick, so delivery order is kept
//! and delivery is at-least-once. Failures never reach the request path.

use nishlen_core::{
    traits::{EventPublisher, OutboxRepository},
    AppResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::constants::{DEFAULT_RELAY_BATCH, DEFAULT_RELAY_INTERVAL_MS};

/// Outbox relay
pub struct OutboxRelay<O: OutboxRepository, E: EventPublisher> {
    outbox: Arc<O>,
    publisher: Arc<E>,
    batch_size: usize,
    interval: Duration,
}

impl<O: OutboxRepository, E: EventPublisher> OutboxRelay<O, E> {
    pub fn new(outbox: Arc<O>, publisher: Arc<E>) -> Self {
        Self {
            outbox,
            publisher,
            batch_size: DEFAULT_RELAY_BATCH,
            interval: Duration::from_millis(DEFAULT_RELAY_INTERVAL_MS),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Deliver one batch; returns how many events were delivered
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> AppResult<usize> {
        let pending = self.outbox.fetch_pending(self.batch_size).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut delivered = Vec::with_capacity(pending.len());
        for entry in &pending {
            match self.publisher.publish(&entry.event).await {
                Ok(()) => delivered.push(entry.id),
                Err(e) => {
                    warn!(
                        "Failed to publish {} for booking {} (attempt {}): {}",
                        entry.event.kind,
                        entry.event.booking_id,
                        entry.attempts + 1,
                        e
                    );
                    self.outbox.record_failure(entry.id, &e.to_string()).await?;
                    break;
                }
            }
        }

        self.outbox.mark_delivered(&delivered).await?;
        debug!("Delivered {} of {} pending events", delivered.len(), pending.len());
        Ok(delivered.len())
    }

    /// Poll the outbox until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Outbox relay started (batch {}, interval {:?})",
            self.batch_size, self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!("Outbox relay pass failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    let stop = changed.is_err() || *shutdown.borrow();
                    if stop {
                        break;
                    }
                }
            }
        }

        // Flush what is already committed before exiting
        if let Err(e) = self.run_once().await {
            error!("Final outbox flush failed: {}", e);
        }
        info!("Outbox relay stopped");
    }
}
