use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use shared::domain::{Entity, EntityFields, EntityId};
use tokio::sync::watch;

use crate::{
    address::{AddressSync, MemoryAddressStore},
    cache::EntityCache,
    coordinator::RequestCoordinator,
    error::EntityError,
    service::EntityService,
    suppression::SuppressionWindow,
    view::{DetailRenderer, ListWidget, Notice, Notifier, ViewSinks},
};

pub fn entity(id: i64, name: &str, child_count: u32) -> Entity {
    let created_at = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
    Entity {
        id: EntityId(id),
        name: name.to_string(),
        child_count,
        created_at,
        updated_at: created_at,
    }
}

/// Yields to the scheduler until `cond` holds.
pub async fn until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailCall {
    Render(Entity),
    Loading(bool),
    Clear,
}

#[derive(Default)]
pub struct RecordingDetail {
    pub calls: Mutex<Vec<DetailCall>>,
}

impl RecordingDetail {
    pub fn rendered(&self) -> Vec<Entity> {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .filter_map(|call| match call {
                DetailCall::Render(entity) => Some(entity.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clears(&self) -> usize {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .filter(|call| **call == DetailCall::Clear)
            .count()
    }

    pub fn last(&self) -> Option<DetailCall> {
        self.calls.lock().expect("lock").last().cloned()
    }
}

impl DetailRenderer for RecordingDetail {
    fn render(&self, entity: &Entity) {
        self.calls
            .lock()
            .expect("lock")
            .push(DetailCall::Render(entity.clone()));
    }

    fn set_loading(&self, loading: bool) {
        self.calls
            .lock()
            .expect("lock")
            .push(DetailCall::Loading(loading));
    }

    fn clear(&self) {
        self.calls.lock().expect("lock").push(DetailCall::Clear);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListCall {
    Reload,
    Highlight(EntityId),
}

#[derive(Default)]
pub struct RecordingList {
    pub calls: Mutex<Vec<ListCall>>,
}

impl RecordingList {
    pub fn reloads(&self) -> usize {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .filter(|call| **call == ListCall::Reload)
            .count()
    }

    pub fn highlights(&self) -> Vec<EntityId> {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .filter_map(|call| match call {
                ListCall::Highlight(id) => Some(*id),
                ListCall::Reload => None,
            })
            .collect()
    }
}

impl ListWidget for RecordingList {
    fn reload(&self) {
        self.calls.lock().expect("lock").push(ListCall::Reload);
    }

    fn highlight(&self, id: EntityId) {
        self.calls.lock().expect("lock").push(ListCall::Highlight(id));
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().expect("lock").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().expect("lock").push(notice);
    }
}

/// Opens a held fetch when released or dropped.
pub struct Gate {
    tx: watch::Sender<bool>,
}

impl Gate {
    pub fn release(&self) {
        let _ = self.tx.send(true);
    }
}

impl Drop for Gate {
    fn drop(&mut self) {
        let _ = self.tx.send(true);
    }
}

#[derive(Default)]
pub struct ScriptedService {
    pub entities: Mutex<HashMap<EntityId, Entity>>,
    pub fetch_calls: Mutex<Vec<EntityId>>,
    pub exists_calls: Mutex<Vec<EntityId>>,
    pub created: Mutex<Vec<EntityFields>>,
    pub updated: Mutex<Vec<(EntityId, EntityFields)>>,
    pub removed: Mutex<Vec<EntityId>>,
    pub fail_with: Mutex<Option<EntityError>>,
    pub name_available: Mutex<bool>,
    gates: Mutex<HashMap<EntityId, watch::Receiver<bool>>>,
    next_id: Mutex<i64>,
}

impl ScriptedService {
    pub fn new() -> Arc<Self> {
        let service = Self::default();
        *service.name_available.lock().expect("lock") = true;
        *service.next_id.lock().expect("lock") = 100;
        Arc::new(service)
    }

    pub fn put(&self, entity: Entity) {
        self.entities
            .lock()
            .expect("lock")
            .insert(entity.id, entity);
    }

    /// Holds every fetch of `id` until the returned gate opens.
    pub fn hold(&self, id: i64) -> Gate {
        let (tx, rx) = watch::channel(false);
        self.gates.lock().expect("lock").insert(EntityId(id), rx);
        Gate { tx }
    }

    pub fn fail(&self, err: EntityError) {
        *self.fail_with.lock().expect("lock") = Some(err);
    }

    pub fn fetches(&self) -> Vec<EntityId> {
        self.fetch_calls.lock().expect("lock").clone()
    }

    pub fn existence_checks(&self) -> Vec<EntityId> {
        self.exists_calls.lock().expect("lock").clone()
    }

    fn failure(&self) -> Option<EntityError> {
        self.fail_with.lock().expect("lock").clone()
    }

    async fn wait_gate(&self, id: EntityId) {
        let gate = self.gates.lock().expect("lock").get(&id).cloned();
        if let Some(mut gate) = gate {
            let _ = gate.wait_for(|open| *open).await;
        }
    }
}

#[async_trait]
impl EntityService for ScriptedService {
    async fn fetch(&self, id: EntityId) -> Result<Entity, EntityError> {
        self.fetch_calls.lock().expect("lock").push(id);
        self.wait_gate(id).await;
        if let Some(err) = self.failure() {
            return Err(err);
        }
        self.entities
            .lock()
            .expect("lock")
            .get(&id)
            .cloned()
            .ok_or(EntityError::NotFound(id))
    }

    async fn exists(&self, id: EntityId) -> Result<bool, EntityError> {
        self.exists_calls.lock().expect("lock").push(id);
        tokio::task::yield_now().await;
        if let Some(err) = self.failure() {
            return Err(err);
        }
        Ok(self.entities.lock().expect("lock").contains_key(&id))
    }

    async fn create(&self, fields: EntityFields) -> Result<EntityId, EntityError> {
        if let Some(err) = self.failure() {
            return Err(err);
        }
        let id = {
            let mut next = self.next_id.lock().expect("lock");
            *next += 1;
            EntityId(*next)
        };
        self.put(entity(id.0, &fields.name, 0));
        self.created.lock().expect("lock").push(fields);
        Ok(id)
    }

    async fn update(&self, id: EntityId, fields: EntityFields) -> Result<(), EntityError> {
        if let Some(err) = self.failure() {
            return Err(err);
        }
        if let Some(existing) = self.entities.lock().expect("lock").get_mut(&id) {
            existing.name = fields.name.clone();
            existing.updated_at = Utc::now();
        }
        self.updated.lock().expect("lock").push((id, fields));
        Ok(())
    }

    async fn remove(&self, id: EntityId) -> Result<(), EntityError> {
        if let Some(err) = self.failure() {
            return Err(err);
        }
        self.entities.lock().expect("lock").remove(&id);
        self.removed.lock().expect("lock").push(id);
        Ok(())
    }

    async fn check_name_available(
        &self,
        _name: &str,
        _exclude_id: Option<EntityId>,
    ) -> Result<bool, EntityError> {
        Ok(*self.name_available.lock().expect("lock"))
    }
}

pub struct Harness {
    pub service: Arc<ScriptedService>,
    pub detail: Arc<RecordingDetail>,
    pub list: Arc<RecordingList>,
    pub notifier: Arc<RecordingNotifier>,
    pub store: Arc<MemoryAddressStore>,
    pub address: Arc<AddressSync>,
    pub cache: Arc<EntityCache>,
    pub coordinator: Arc<RequestCoordinator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_fragment("")
    }

    pub fn with_fragment(fragment: &str) -> Self {
        let service = ScriptedService::new();
        let detail = Arc::new(RecordingDetail::default());
        let list = Arc::new(RecordingList::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let store = Arc::new(MemoryAddressStore::with_fragment(fragment));
        let address = Arc::new(AddressSync::new(
            store.clone(),
            SuppressionWindow::default(),
        ));
        let cache = Arc::new(EntityCache::new());
        let coordinator = RequestCoordinator::new(
            service.clone(),
            Arc::clone(&cache),
            Arc::clone(&address),
            ViewSinks {
                detail: detail.clone(),
                list: list.clone(),
            },
            notifier.clone(),
        );
        Self {
            service,
            detail,
            list,
            notifier,
            store,
            address,
            cache,
            coordinator,
        }
    }

    pub fn fragment(&self) -> String {
        use crate::address::AddressStore;
        self.store.fragment()
    }
}
