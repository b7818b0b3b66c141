//! In-process store
//!
//! Implements every repository trait over one mutex-guarded state. Each
//! trait method takes the lock exactly once, so a method body is the
//! in-memory equivalent of one database transaction: its checks and writes
//! are observed together or not at all. Referential rules of the SQL schema
//! (cascade on master removal, `SET NULL` on client removal) are mirrored by
//! the explicit removal helpers.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use nishlen_core::{
    models::{
        Booking, BookingEvent, BookingStatus, EventKind, Master, NewBooking, NewSlot,
        OutboxEntry, Service, ServiceFilter, Slot,
    },
    traits::{
        BookingRepository, MasterRepository, OutboxRepository, ServiceRepository, SlotRepository,
    },
    AppError, AppResult,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Default)]
struct State {
    masters: HashMap<Uuid, Master>,
    slots: HashMap<Uuid, Slot>,
    services: Vec<Service>,
    bookings: HashMap<Uuid, Booking>,
    /// Booking ids in creation order
    booking_order: Vec<Uuid>,
    outbox: Vec<OutboxEntry>,
    next_outbox_id: i64,
}

impl State {
    fn reserve(&mut self, id: Uuid) -> AppResult<Slot> {
        let slot = self
            .slots
            .get_mut(&id)
            .ok_or_else(|| AppError::SlotNotFound(id.to_string()))?;
        if !slot.is_available {
            return Err(AppError::SlotUnavailable(id.to_string()));
        }
        slot.is_available = false;
        Ok(slot.clone())
    }

    fn release(&mut self, id: Uuid) -> AppResult<Slot> {
        let slot = self
            .slots
            .get_mut(&id)
            .ok_or_else(|| AppError::SlotNotFound(id.to_string()))?;
        slot.is_available = true;
        Ok(slot.clone())
    }

    fn enqueue(&mut self, event: BookingEvent) {
        self.next_outbox_id += 1;
        self.outbox.push(OutboxEntry {
            id: self.next_outbox_id,
            event,
            created_at: Utc::now(),
            delivered_at: None,
            attempts: 0,
        });
    }
}

/// Mutex-guarded in-memory implementation of all repositories
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a master, replacing any previous record with the same id
    pub fn insert_master(&self, master: Master) {
        self.state.lock().masters.insert(master.id, master);
    }

    /// Remove a master together with everything it owns
    pub fn remove_master(&self, id: Uuid) {
        let mut state = self.state.lock();
        state.masters.remove(&id);
        state.slots.retain(|_, slot| slot.master_id != id);
        state.services.retain(|service| service.master_id != id);
        state.bookings.retain(|_, booking| booking.master_id != id);
        let State {
            bookings,
            booking_order,
            ..
        } = &mut *state;
        booking_order.retain(|booking_id| bookings.contains_key(booking_id));
        info!("Removed master {} and owned records", id);
    }

    /// Detach a removed client from its bookings
    pub fn remove_client(&self, id: Uuid) {
        let mut state = self.state.lock();
        for booking in state.bookings.values_mut() {
            if booking.client_id == Some(id) {
                booking.client_id = None;
            }
        }
    }

    /// Every outbox entry, delivered or not, in creation order
    pub fn outbox_snapshot(&self) -> Vec<OutboxEntry> {
        self.state.lock().outbox.clone()
    }
}

#[async_trait]
impl SlotRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Slot>> {
        Ok(self.state.lock().slots.get(&id).cloned())
    }

    #[instrument(skip(self, request), fields(master_id = %request.master_id, date = %request.date))]
    async fn publish(&self, request: &NewSlot) -> AppResult<Slot> {
        let mut state = self.state.lock();

        if !state.masters.contains_key(&request.master_id) {
            return Err(AppError::MasterNotFound(request.master_id.to_string()));
        }

        if let Some(existing) = state.slots.values().find(|slot| {
            slot.master_id == request.master_id
                && slot.date == request.date
                && slot.overlaps(request.start_time, request.end_time)
        }) {
            debug!("Slot request overlaps slot {}", existing.id);
            return Err(AppError::SlotOverlap(existing.id.to_string()));
        }

        let slot = Slot::from_request(request);
        state.slots.insert(slot.id, slot.clone());
        Ok(slot)
    }

    async fn list_available(&self, master_id: Uuid, date: NaiveDate) -> AppResult<Vec<Slot>> {
        let state = self.state.lock();
        let mut slots: Vec<Slot> = state
            .slots
            .values()
            .filter(|slot| slot.master_id == master_id && slot.date == date && slot.is_available)
            .cloned()
            .collect();
        slots.sort_by_key(|slot| slot.start_time);
        Ok(slots)
    }

    async fn reserve(&self, id: Uuid) -> AppResult<Slot> {
        self.state.lock().reserve(id)
    }

    async fn release(&self, id: Uuid) -> AppResult<Slot> {
        self.state.lock().release(id)
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Booking>> {
        Ok(self.state.lock().bookings.get(&id).cloned())
    }

    #[instrument(skip(self, request), fields(slot_id = %request.slot_id, status = %request.status))]
    async fn create_reserving_slot(&self, request: &NewBooking) -> AppResult<Booking> {
        let mut state = self.state.lock();

        if !state.services.iter().any(|s| s.id == request.service_id) {
            return Err(AppError::ServiceNotFound(request.service_id.to_string()));
        }

        state.reserve(request.slot_id)?;

        let booking = Booking::from_request(request);
        state.bookings.insert(booking.id, booking.clone());
        state.booking_order.push(booking.id);
        state.enqueue(BookingEvent::created(&booking));

        debug!("Created booking {}", booking.id);
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

        let mut state = self.state.lock();

        let booking = state
            .bookings
            .get_mut(&id)
            .ok_or_else(|| AppError::BookingNotFound(id.to_string()))?;

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
        let booking = booking.clone();

        if from.releases_slot(to) {
            state.release(booking.slot_id)?;
        }
        if let Some(kind) = EventKind::for_transition(to) {
            state.enqueue(BookingEvent::new(kind, &booking));
        }

        Ok(booking)
    }

    async fn list_by_client(&self, client_id: Uuid) -> AppResult<Vec<Booking>> {
        let state = self.state.lock();
        Ok(state
            .booking_order
            .iter()
            .rev()
            .filter_map(|id| state.bookings.get(id))
            .filter(|booking| booking.client_id == Some(client_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ServiceRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Service>> {
        Ok(self
            .state
            .lock()
            .services
            .iter()
            .find(|service| service.id == id)
            .cloned())
    }

    async fn create(&self, service: &Service) -> AppResult<Service> {
        let mut state = self.state.lock();
        if !state.masters.contains_key(&service.master_id) {
            return Err(AppError::MasterNotFound(service.master_id.to_string()));
        }
        state.services.push(service.clone());
        Ok(service.clone())
    }

    async fn list(&self, filter: &ServiceFilter) -> AppResult<Vec<Service>> {
        let state = self.state.lock();
        Ok(state
            .services
            .iter()
            .filter(|service| filter.master_id.map_or(true, |id| service.master_id == id))
            .filter(|service| match &filter.city {
                None => true,
                Some(city) => state
                    .masters
                    .get(&service.master_id)
                    .and_then(|master| master.city.as_ref())
                    .map_or(false, |c| c == city),
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MasterRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Master>> {
        Ok(self.state.lock().masters.get(&id).cloned())
    }
}

#[async_trait]
impl OutboxRepository for MemoryStore {
    async fn fetch_pending(&self, limit: usize) -> AppResult<Vec<OutboxEntry>> {
        Ok(self
            .state
            .lock()
            .outbox
            .iter()
            .filter(|entry| entry.delivered_at.is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_delivered(&self, ids: &[i64]) -> AppResult<()> {
        let now = Utc::now();
        let mut state = self.state.lock();
        for entry in state.outbox.iter_mut() {
            if entry.delivered_at.is_none() && ids.contains(&entry.id) {
                entry.delivered_at = Some(now);
            }
        }
        Ok(())
    }

    async fn record_failure(&self, id: i64, reason: &str) -> AppResult<()> {
        let mut state = self.state.lock();
        if let Some(entry) = state.outbox.iter_mut().find(|entry| entry.id == id) {
            entry.attempts += 1;
            debug!("Outbox entry {} failed {} times: {}", id, entry.attempts, reason);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn t(h: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, 0, 0).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, 15).unwrap()
    }

    async fn seeded() -> (MemoryStore, Uuid, Uuid, Slot) {
        let store = MemoryStore::new();
        let master = Uuid::new_v4();
        store.insert_master(Master::new(master).with_city("Samarkand"));
        let service = Service {
            id: Uuid::new_v4(),
            master_id: master,
            name: "Manicure".to_string(),
            description: None,
            price: rust_decimal::Decimal::new(1500, 2),
            duration_min: 60,
            created_at: Utc::now(),
        };
        ServiceRepository::create(&store, &service).await.unwrap();
        let slot = store
            .publish(&NewSlot::new(master, date(), t(10), t(11)))
            .await
            .unwrap();
        (store, master, service.id, slot)
    }

    fn request(master: Uuid, service: Uuid, slot: Uuid, client: Option<Uuid>) -> NewBooking {
        NewBooking {
            client_id: client,
            requested_by: client.unwrap_or_else(Uuid::new_v4),
            master_id: master,
            service_id: service,
            slot_id: slot,
            status: BookingStatus::Pending,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_publish_overlap_and_order() {
        let (store, master, _, _) = seeded().await;

        let err = store
            .publish(&NewSlot::new(master, date(), t(9), t(11)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotOverlap(_)));

        store
            .publish(&NewSlot::new(master, date(), t(8), t(9)))
            .await
            .unwrap();
        let slots = store.list_available(master, date()).await.unwrap();
        assert_eq!(
            slots.iter().map(|s| s.start_time).collect::<Vec<_>>(),
            vec![t(8), t(10)]
        );
    }

    #[tokio::test]
    async fn test_failed_create_writes_nothing() {
        let (store, master, service, slot) = seeded().await;
        store.reserve(slot.id).await.unwrap();

        let err = store
            .create_reserving_slot(&request(master, service, slot.id, None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotUnavailable(_)));
        assert!(store.outbox_snapshot().is_empty());
        assert!(store.list_by_client(master).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let (store, master, service, slot) = seeded().await;
        let booking = store
            .create_reserving_slot(&request(master, service, slot.id, None))
            .await
            .unwrap();

        let confirmed = store
            .transition(booking.id, BookingStatus::Pending, BookingStatus::Confirmed)
            .await
            .unwrap();
        assert!(confirmed.confirmed_at.is_some());

        let stale = store
            .transition(booking.id, BookingStatus::Pending, BookingStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(stale.is_conflict());

        let kinds: Vec<EventKind> = store
            .outbox_snapshot()
            .into_iter()
            .map(|e| e.event.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![EventKind::BookingCreated, EventKind::BookingConfirmed]
        );
    }

    #[tokio::test]
    async fn test_list_by_client_newest_first() {
        let (store, master, service, first) = seeded().await;
        let second = store
            .publish(&NewSlot::new(master, date(), t(12), t(13)))
            .await
            .unwrap();
        let client = Uuid::new_v4();

        let a = store
            .create_reserving_slot(&request(master, service, first.id, Some(client)))
            .await
            .unwrap();
        let b = store
            .create_reserving_slot(&request(master, service, second.id, Some(client)))
            .await
            .unwrap();

        let ids: Vec<Uuid> = store
            .list_by_client(client)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[tokio::test]
    async fn test_remove_master_cascades_and_client_is_detached() {
        let (store, master, service, slot) = seeded().await;
        let client = Uuid::new_v4();
        let booking = store
            .create_reserving_slot(&request(master, service, slot.id, Some(client)))
            .await
            .unwrap();

        store.remove_client(client);
        let detached = BookingRepository::find_by_id(&store, booking.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(detached.client_id, None);

        store.remove_master(master);
        assert!(BookingRepository::find_by_id(&store, booking.id)
            .await
            .unwrap()
            .is_none());
        assert!(SlotRepository::find_by_id(&store, slot.id)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .list(&ServiceFilter::by_master(master))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_outbox_delivery_bookkeeping() {
        let (store, master, service, slot) = seeded().await;
        store
            .create_reserving_slot(&request(master, service, slot.id, None))
            .await
            .unwrap();

        let pending = store.fetch_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);

        store.record_failure(pending[0].id, "redis down").await.unwrap();
        assert_eq!(store.fetch_pending(10).await.unwrap()[0].attempts, 1);

        store.mark_delivered(&[pending[0].id]).await.unwrap();
        assert!(store.fetch_pending(10).await.unwrap().is_empty());
    }
}
