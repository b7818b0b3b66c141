//! Service catalog and read-side queries

use nishlen_core::{
    models::{BookingEvent, Caller, NewService, Service, ServiceFilter},
    policy,
    traits::{EventPublisher, MasterRepository, ServiceRepository},
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::constants::DEFAULT_RECENT_EVENTS;

/// Catalog of services plus the recent-events feed
pub struct Catalog<V: ServiceRepository, M: MasterRepository, E: EventPublisher> {
    service_repo: Arc<V>,
    master_repo: Arc<M>,
    events: Arc<E>,
    recent_limit: usize,
}

impl<V: ServiceRepository, M: MasterRepository, E: EventPublisher> Catalog<V, M, E> {
    pub fn new(service_repo: Arc<V>, master_repo: Arc<M>, events: Arc<E>) -> Self {
        Self {
            service_repo,
            master_repo,
            events,
            recent_limit: DEFAULT_RECENT_EVENTS,
        }
    }

    /// Override how many events `recent_events` returns
    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit;
        self
    }

    /// Services filtered by master and/or the master's city
    #[instrument(skip(self))]
    pub async fn list_services(&self, filter: &ServiceFilter) -> AppResult<Vec<Service>> {
        self.service_repo.list(filter).await
    }

    /// Add a service to a master's catalog
    #[instrument(skip(self, caller, request), fields(caller = %caller.id))]
    pub async fn create_service(
        &self,
        caller: &Caller,
        master_id: Uuid,
        request: &NewService,
    ) -> AppResult<Service> {
        request.check()?;

        let master = self
            .master_repo
            .find_by_id(master_id)
            .await?
            .ok_or_else(|| AppError::MasterNotFound(master_id.to_string()))?;

        policy::can_manage_services(caller, &master).map_err(|e| {
            warn!("Rejected service creation: {}", e);
            e
        })?;

        let service = self
            .service_repo
            .create(&Service::from_request(master_id, request))
            .await?;
        info!("Master {} added service {}", master_id, service.id);
        Ok(service)
    }

    /// Most recent booking events, newest first
    #[instrument(skip(self))]
    pub async fn recent_events(&self) -> AppResult<Vec<BookingEvent>> {
        self.events.recent(self.recent_limit).await
    }
}
