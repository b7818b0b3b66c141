//! Slot ledger service
//!
//! Owns the lifecycle of schedule slots: masters (or their salon admin)
//! publish non-overlapping windows, clients browse the available ones, and
//! the booking state machine reserves and releases them.

use chrono::NaiveDate;
use nishlen_core::{
    models::{Caller, NewSlot, Slot},
    policy,
    traits::{MasterRepository, SlotRepository},
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Slot ledger
pub struct SlotLedger<S: SlotRepository, M: MasterRepository> {
    slot_repo: Arc<S>,
    master_repo: Arc<M>,
}

impl<S: SlotRepository, M: MasterRepository> SlotLedger<S, M> {
    /// Create a new slot ledger
    pub fn new(slot_repo: Arc<S>, master_repo: Arc<M>) -> Self {
        Self {
            slot_repo,
            master_repo,
        }
    }

    /// Publish a new available slot for a master
    ///
    /// # Errors
    ///
    /// - `Validation` if the window is empty or inverted
    /// - `MasterNotFound` if the master does not exist
    /// - `Forbidden` if the caller may not manage the master's schedule
    /// - `SlotOverlap` if the window overlaps another slot on that date
    #[instrument(skip(self, caller, request), fields(caller = %caller.id, master_id = %request.master_id))]
    pub async fn publish_slot(&self, caller: &Caller, request: NewSlot) -> AppResult<Slot> {
        request.validate()?;

        let master = self
            .master_repo
            .find_by_id(request.master_id)
            .await?
            .ok_or_else(|| {
                warn!("Slot publish for unknown master {}", request.master_id);
                AppError::MasterNotFound(request.master_id.to_string())
            })?;

        policy::can_publish_slot(caller, &master).map_err(|e| {
            warn!("Rejected slot publish: {}", e);
            e
        })?;

        let slot = self.slot_repo.publish(&request).await?;
        info!(
            "Master {} published slot {} on {} {}-{}",
            slot.master_id, slot.id, slot.date, slot.start_time, slot.end_time
        );
        Ok(slot)
    }

    /// Available slots of a master on a date, ordered by start time
    #[instrument(skip(self))]
    pub async fn list_slots(&self, master_id: Uuid, date: NaiveDate) -> AppResult<Vec<Slot>> {
        self.slot_repo.list_available(master_id, date).await
    }

    /// Mark a slot unavailable
    #[instrument(skip(self))]
    pub async fn reserve(&self, slot_id: Uuid) -> AppResult<Slot> {
        self.slot_repo.reserve(slot_id).await
    }

    /// Mark a slot available again; releasing twice is not an error
    #[instrument(skip(self))]
    pub async fn release(&self, slot_id: Uuid) -> AppResult<Slot> {
        self.slot_repo.release(slot_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{day, store_with_master, time};
    use futures::future::join_all;
    use nishlen_core::models::{Master, UserRole};
    use nishlen_db::MemoryStore;

    fn ledger(master: Uuid) -> SlotLedger<MemoryStore, MemoryStore> {
        let store = store_with_master(Master::new(master));
        SlotLedger::new(store.clone(), store)
    }

    #[tokio::test]
    async fn test_overlapping_publish_is_rejected() {
        let master = Uuid::new_v4();
        let ledger = ledger(master);
        let caller = Caller::master(master);

        ledger
            .publish_slot(&caller, NewSlot::new(master, day(), time(10, 0), time(10, 30)))
            .await
            .unwrap();

        let err = ledger
            .publish_slot(&caller, NewSlot::new(master, day(), time(10, 15), time(10, 45)))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        // Adjacent windows do not overlap
        ledger
            .publish_slot(&caller, NewSlot::new(master, day(), time(10, 30), time(11, 0)))
            .await
            .unwrap();

        // Another date is independent
        let next_day = day().succ_opt().unwrap();
        ledger
            .publish_slot(&caller, NewSlot::new(master, next_day, time(10, 0), time(10, 30)))
            .await
            .unwrap();

        let slots = ledger.list_slots(master, day()).await.unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].start_time, time(10, 0));
        assert_eq!(slots[1].start_time, time(10, 30));
    }

    #[tokio::test]
    async fn test_publish_error_order() {
        let master = Uuid::new_v4();
        let ledger = ledger(master);

        let inverted = ledger
            .publish_slot(
                &Caller::client(Uuid::new_v4()),
                NewSlot::new(master, day(), time(11, 0), time(10, 0)),
            )
            .await
            .unwrap_err();
        assert!(inverted.is_validation());

        let unknown = Uuid::new_v4();
        let missing = ledger
            .publish_slot(
                &Caller::master(unknown),
                NewSlot::new(unknown, day(), time(9, 0), time(10, 0)),
            )
            .await
            .unwrap_err();
        assert!(missing.is_not_found());

        let forbidden = ledger
            .publish_slot(
                &Caller::master(Uuid::new_v4()),
                NewSlot::new(master, day(), time(9, 0), time(10, 0)),
            )
            .await
            .unwrap_err();
        assert!(forbidden.is_forbidden());
    }

    #[tokio::test]
    async fn test_salon_admin_publishes_for_affiliated_master() {
        let master = Uuid::new_v4();
        let admin = Caller::new(Uuid::new_v4(), UserRole::SalonAdmin);
        let store = store_with_master(Master::new(master).with_salon_admin(admin.id));
        let ledger = SlotLedger::new(store.clone(), store);

        let slot = ledger
            .publish_slot(&admin, NewSlot::new(master, day(), time(12, 0), time(13, 0)))
            .await
            .unwrap();
        assert_eq!(slot.master_id, master);
        assert!(slot.is_available);
    }

    #[tokio::test]
    async fn test_salon_admin_of_other_salon_is_forbidden() {
        let master = Uuid::new_v4();
        let store = store_with_master(Master::new(master).with_salon_admin(Uuid::new_v4()));
        let ledger = SlotLedger::new(store.clone(), store);
        let outsider = Caller::new(Uuid::new_v4(), UserRole::SalonAdmin);

        let err = ledger
            .publish_slot(&outsider, NewSlot::new(master, day(), time(12, 0), time(13, 0)))
            .await
            .unwrap_err();
        assert!(err.is_forbidden());
        assert!(ledger.list_slots(master, day()).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_overlapping_publish_single_winner() {
        let master = Uuid::new_v4();
        let ledger = Arc::new(ledger(master));

        // Every window covers 10:30-11:00, so at most one can be published
        let attempts: Vec<_> = (0..8u32)
            .map(|i| {
                let ledger = ledger.clone();
                let request = NewSlot::new(master, day(), time(10, i), time(11, i));
                tokio::spawn(async move {
                    ledger.publish_slot(&Caller::master(master), request).await
                })
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
        assert_eq!(ledger.list_slots(master, day()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let master = Uuid::new_v4();
        let ledger = ledger(master);
        let slot = ledger
            .publish_slot(
                &Caller::master(master),
                NewSlot::new(master, day(), time(14, 0), time(15, 0)),
            )
            .await
            .unwrap();

        assert!(!ledger.reserve(slot.id).await.unwrap().is_available);
        assert!(ledger.reserve(slot.id).await.unwrap_err().is_conflict());

        assert!(ledger.release(slot.id).await.unwrap().is_available);
        assert!(ledger.release(slot.id).await.unwrap().is_available);

        assert!(ledger.release(Uuid::new_v4()).await.unwrap_err().is_not_found());
    }
}
