//! Create, update and delete flows. Each one talks to the remote service,
//! keeps the cache honest, and announces completion on the event bus; the
//! coordinator reacts to those events and never starts a mutation itself.

use std::{sync::Arc, time::Duration};

use shared::{
    domain::{Entity, EntityFields, EntityId},
    protocol::EntityEvent,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    cache::EntityCache,
    coordinator::RequestCoordinator,
    error::EntityError,
    service::EntityService,
    view::{Notice, NoticeLevel, Notifier},
};

pub struct EntityFlows {
    service: Arc<dyn EntityService>,
    cache: Arc<EntityCache>,
    notifier: Arc<dyn Notifier>,
    notice_duration: Duration,
    events: broadcast::Sender<EntityEvent>,
}

impl EntityFlows {
    pub fn new(
        service: Arc<dyn EntityService>,
        cache: Arc<EntityCache>,
        notifier: Arc<dyn Notifier>,
        notice_duration: Duration,
        events: broadcast::Sender<EntityEvent>,
    ) -> Self {
        Self {
            service,
            cache,
            notifier,
            notice_duration,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EntityEvent> {
        self.events.subscribe()
    }

    pub async fn create(&self, fields: EntityFields) -> Result<EntityId, EntityError> {
        let result = self.try_create(fields).await;
        self.report(result, "Entity created")
    }

    pub async fn update(&self, id: EntityId, fields: EntityFields) -> Result<(), EntityError> {
        let result = self.try_update(id, fields).await;
        self.report(result, "Entity updated")
    }

    pub async fn delete(&self, id: EntityId) -> Result<(), EntityError> {
        let result = self.try_delete(id).await;
        self.report(result, "Entity deleted")
    }

    /// Cache-first lookup used to prefill an edit form.
    pub async fn load_for_edit(&self, id: EntityId) -> Result<Entity, EntityError> {
        if let Some(entity) = self.cache.get(id) {
            return Ok(entity);
        }
        match self.service.fetch(id).await {
            Ok(entity) => {
                self.cache.set(id, entity.clone());
                Ok(entity)
            }
            Err(err) => {
                warn!(entity_id = id.0, "flows: edit prefill failed: {err}");
                self.notify(NoticeLevel::Error, err.user_message());
                Err(err)
            }
        }
    }

    async fn try_create(&self, fields: EntityFields) -> Result<EntityId, EntityError> {
        self.ensure_name_available(&fields.name, None).await?;
        let id = self.service.create(fields).await?;
        info!(entity_id = id.0, "flows: entity created");
        let _ = self.events.send(EntityEvent::Created { id });
        Ok(id)
    }

    async fn try_update(&self, id: EntityId, fields: EntityFields) -> Result<(), EntityError> {
        self.ensure_name_available(&fields.name, Some(id)).await?;
        self.service.update(id, fields).await?;
        self.cache.invalidate(id);
        info!(entity_id = id.0, "flows: entity updated");
        let _ = self.events.send(EntityEvent::Updated { id });
        Ok(())
    }

    async fn try_delete(&self, id: EntityId) -> Result<(), EntityError> {
        self.service.remove(id).await?;
        self.cache.invalidate(id);
        info!(entity_id = id.0, "flows: entity deleted");
        let _ = self.events.send(EntityEvent::Deleted { id });
        Ok(())
    }

    async fn ensure_name_available(
        &self,
        name: &str,
        exclude_id: Option<EntityId>,
    ) -> Result<(), EntityError> {
        if self
            .service
            .check_name_available(name.trim(), exclude_id)
            .await?
        {
            Ok(())
        } else {
            Err(EntityError::Conflict(format!(
                "name '{}' already exists",
                name.trim()
            )))
        }
    }

    fn report<T>(&self, result: Result<T, EntityError>, success: &str) -> Result<T, EntityError> {
        match &result {
            Ok(_) => self.notify(NoticeLevel::Success, success),
            Err(err) => {
                warn!("flows: mutation failed: {err}");
                self.notify(NoticeLevel::Error, err.user_message());
            }
        }
        result
    }

    fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        self.notifier
            .notify(Notice::new(level, message, self.notice_duration));
    }
}

/// Forwards completion events to the coordinator until the bus closes.
pub fn spawn_event_pump(
    mut events: broadcast::Receiver<EntityEvent>,
    coordinator: Arc<RequestCoordinator>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => coordinator.handle_event(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "flows: event pump lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
#[path = "tests/flows_tests.rs"]
mod tests;
