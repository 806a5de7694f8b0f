use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use shared::domain::{Entity, EntityFields, EntityId};
use tokio::sync::Mutex;

use crate::error::EntityError;

/// Remote side of every entity operation. Retry policy, if any, belongs to
/// implementations of this trait.
#[async_trait]
pub trait EntityService: Send + Sync {
    async fn fetch(&self, id: EntityId) -> Result<Entity, EntityError>;
    /// Lightweight existence probe used to validate deep links.
    async fn exists(&self, id: EntityId) -> Result<bool, EntityError>;
    async fn create(&self, fields: EntityFields) -> Result<EntityId, EntityError>;
    async fn update(&self, id: EntityId, fields: EntityFields) -> Result<(), EntityError>;
    async fn remove(&self, id: EntityId) -> Result<(), EntityError>;
    async fn check_name_available(
        &self,
        name: &str,
        exclude_id: Option<EntityId>,
    ) -> Result<bool, EntityError>;
}

/// Process-local service used by the CLI and by tests that do not need to
/// script individual responses.
pub struct InMemoryEntityService {
    latency: Duration,
    inner: Mutex<InMemoryState>,
}

struct InMemoryState {
    next_id: i64,
    entities: BTreeMap<EntityId, Entity>,
}

impl InMemoryEntityService {
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            inner: Mutex::new(InMemoryState {
                next_id: 1,
                entities: BTreeMap::new(),
            }),
        }
    }

    /// Delays every call by `latency` before touching state.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Inserts an entity with a fixed id, bypassing name checks.
    pub async fn seed(&self, id: EntityId, name: &str, child_count: u32) -> Entity {
        let now = Utc::now();
        let entity = Entity {
            id,
            name: name.to_string(),
            child_count,
            created_at: now,
            updated_at: now,
        };
        let mut guard = self.inner.lock().await;
        guard.next_id = guard.next_id.max(id.0 + 1);
        guard.entities.insert(id, entity.clone());
        entity
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl Default for InMemoryEntityService {
    fn default() -> Self {
        Self::new()
    }
}

fn name_taken(state: &InMemoryState, name: &str, exclude_id: Option<EntityId>) -> bool {
    let wanted = name.trim().to_lowercase();
    state
        .entities
        .values()
        .any(|entity| Some(entity.id) != exclude_id && entity.name.to_lowercase() == wanted)
}

#[async_trait]
impl EntityService for InMemoryEntityService {
    async fn fetch(&self, id: EntityId) -> Result<Entity, EntityError> {
        self.simulate_latency().await;
        let guard = self.inner.lock().await;
        guard
            .entities
            .get(&id)
            .cloned()
            .ok_or(EntityError::NotFound(id))
    }

    async fn exists(&self, id: EntityId) -> Result<bool, EntityError> {
        self.simulate_latency().await;
        Ok(self.inner.lock().await.entities.contains_key(&id))
    }

    async fn create(&self, fields: EntityFields) -> Result<EntityId, EntityError> {
        self.simulate_latency().await;
        let mut guard = self.inner.lock().await;
        if name_taken(&guard, &fields.name, None) {
            return Err(EntityError::Conflict(format!(
                "name '{}' already exists",
                fields.name.trim()
            )));
        }
        let id = EntityId(guard.next_id);
        guard.next_id += 1;
        let now = Utc::now();
        guard.entities.insert(
            id,
            Entity {
                id,
                name: fields.name.trim().to_string(),
                child_count: 0,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn update(&self, id: EntityId, fields: EntityFields) -> Result<(), EntityError> {
        self.simulate_latency().await;
        let mut guard = self.inner.lock().await;
        if name_taken(&guard, &fields.name, Some(id)) {
            return Err(EntityError::Conflict(format!(
                "name '{}' already exists",
                fields.name.trim()
            )));
        }
        let entity = guard
            .entities
            .get_mut(&id)
            .ok_or(EntityError::NotFound(id))?;
        entity.name = fields.name.trim().to_string();
        entity.updated_at = Utc::now();
        Ok(())
    }

    async fn remove(&self, id: EntityId) -> Result<(), EntityError> {
        self.simulate_latency().await;
        self.inner
            .lock()
            .await
            .entities
            .remove(&id)
            .map(|_| ())
            .ok_or(EntityError::NotFound(id))
    }

    async fn check_name_available(
        &self,
        name: &str,
        exclude_id: Option<EntityId>,
    ) -> Result<bool, EntityError> {
        self.simulate_latency().await;
        let guard = self.inner.lock().await;
        Ok(!name_taken(&guard, name, exclude_id))
    }
}
