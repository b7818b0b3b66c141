//! In-process event log
//!
//! Subscribers attach through a tokio broadcast channel; the recent log is a
//! bounded deque. Delivery can be switched to fail, which lets callers
//! exercise their retry paths.

use async_trait::async_trait;
use nishlen_core::models::BookingEvent;
use nishlen_core::traits::EventPublisher;
use nishlen_core::AppError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

const SUBSCRIBER_BUFFER: usize = 256;

pub struct MemoryEventLog {
    capacity: usize,
    recent: Mutex<VecDeque<BookingEvent>>,
    sender: broadcast::Sender<BookingEvent>,
    failing: AtomicBool,
}

impl MemoryEventLog {
    /// Keep at most `capacity` recent events
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        Self {
            capacity: capacity.max(1),
            recent: Mutex::new(VecDeque::new()),
            sender,
            failing: AtomicBool::new(false),
        }
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.sender.subscribe()
    }

    /// Make subsequent publishes fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventPublisher for MemoryEventLog {
    async fn publish(&self, event: &BookingEvent) -> Result<(), AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::CacheConnection("event channel unavailable".into()));
        }

        // No receivers is not an error
        let _ = self.sender.send(event.clone());

        let mut recent = self.recent.lock();
        recent.push_front(event.clone());
        recent.truncate(self.capacity);
        debug!("Recorded {} for booking {}", event.kind, event.booking_id);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<BookingEvent>, AppError> {
        Ok(self.recent.lock().iter().take(limit).cloned().collect())
    }
}
