use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use shared::domain::{Entity, EntityId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub entity: Entity,
    pub cached_at: DateTime<Utc>,
}

/// Session-scoped snapshot store keyed by entity id.
///
/// Entries only leave through [`EntityCache::invalidate`] or
/// [`EntityCache::clear`]; there is no eviction policy. Every operation takes
/// the lock once, so a reader never observes a half-applied write.
#[derive(Default)]
pub struct EntityCache {
    entries: Mutex<HashMap<EntityId, CacheEntry>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<EntityId, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, id: EntityId) -> Option<Entity> {
        self.entries().get(&id).map(|entry| entry.entity.clone())
    }

    pub fn entry(&self, id: EntityId) -> Option<CacheEntry> {
        self.entries().get(&id).cloned()
    }

    /// Stores `entity` under `id`, replacing any previous snapshot.
    pub fn set(&self, id: EntityId, entity: Entity) {
        self.entries().insert(
            id,
            CacheEntry {
                entity,
                cached_at: Utc::now(),
            },
        );
    }

    pub fn invalidate(&self, id: EntityId) {
        self.entries().remove(&id);
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
