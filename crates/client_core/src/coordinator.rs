//! Load arbitration between competing trigger sources.
//!
//! At most one load occupies the active slot and at most one waits in the
//! pending slot. A request that does not outrank the active one replaces
//! whatever is pending; a request that does outrank it flags the active load
//! for cancellation, takes over the slot, and waits for the cancelled load to
//! exit before doing any work of its own. Cancellation is cooperative: the
//! running load polls its flag at fixed [`Checkpoint`]s and abandons without
//! touching views, cache, or address once it sees the flag.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use shared::{
    domain::{Entity, EntityId, LoadRequest, Source},
    protocol::EntityEvent,
};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::{
    address::AddressSync,
    cache::EntityCache,
    config::Settings,
    error::EntityError,
    service::EntityService,
    view::{Notice, NoticeLevel, Notifier, ViewSinks},
};

/// Points at which a running load checks whether it was superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// After waiting for a preempted predecessor to exit.
    Handoff,
    Validation,
    CacheLookup,
    Fetch,
    ViewUpdate,
}

#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    Started(LoadRequest),
    Deferred {
        request: LoadRequest,
        replaced: Option<LoadRequest>,
    },
    Preempted {
        cancelled: LoadRequest,
        by: LoadRequest,
    },
    Cancelled {
        request: LoadRequest,
        checkpoint: Checkpoint,
    },
    Displayed {
        request: LoadRequest,
        entity: Entity,
    },
    Failed {
        request: LoadRequest,
        error: EntityError,
    },
    DeleteCompleted {
        id: EntityId,
        was_current: bool,
    },
    SelectionCleared,
    Idle,
}

/// Point-in-time view of the coordinator's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoordinatorSnapshot {
    pub is_loading: bool,
    pub active_source: Option<Source>,
    pub current_id: Option<EntityId>,
    pub pending_request: Option<LoadRequest>,
    pub cancel_requested: bool,
}

struct ActiveLoad {
    ticket: u64,
    request: LoadRequest,
    cancel: Arc<AtomicBool>,
    finished: watch::Receiver<bool>,
}

/// Held by the task running a load; dropping it releases any successor
/// waiting on the hand-off.
struct LoadTicket {
    id: u64,
    cancel: Arc<AtomicBool>,
    finished: watch::Sender<bool>,
}

impl LoadTicket {
    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn mark_finished(&self) {
        let _ = self.finished.send(true);
    }
}

#[derive(Default)]
struct CoordinatorState {
    current_id: Option<EntityId>,
    active: Option<ActiveLoad>,
    pending: Option<LoadRequest>,
    next_ticket: u64,
}

impl CoordinatorState {
    fn claim(&mut self, request: LoadRequest) -> LoadTicket {
        self.next_ticket += 1;
        let cancel = Arc::new(AtomicBool::new(false));
        let (finished, finished_rx) = watch::channel(false);
        self.active = Some(ActiveLoad {
            ticket: self.next_ticket,
            request,
            cancel: Arc::clone(&cancel),
            finished: finished_rx,
        });
        LoadTicket {
            id: self.next_ticket,
            cancel,
            finished,
        }
    }

    fn owns_active(&self, ticket: &LoadTicket) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.ticket == ticket.id)
    }
}

enum Arbitration {
    Deferred,
    Start {
        ticket: LoadTicket,
        predecessor: Option<watch::Receiver<bool>>,
    },
}

enum LoadOutcome {
    Displayed(Entity),
    Cancelled(Checkpoint),
    Failed(EntityError),
}

pub struct RequestCoordinator {
    service: Arc<dyn EntityService>,
    cache: Arc<EntityCache>,
    address: Arc<AddressSync>,
    views: ViewSinks,
    notifier: Arc<dyn Notifier>,
    notice_duration: Duration,
    state: Mutex<CoordinatorState>,
    events: broadcast::Sender<CoordinatorEvent>,
    outstanding: watch::Sender<usize>,
}

impl RequestCoordinator {
    pub fn new(
        service: Arc<dyn EntityService>,
        cache: Arc<EntityCache>,
        address: Arc<AddressSync>,
        views: ViewSinks,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        Self::new_with_settings(
            service,
            cache,
            address,
            views,
            notifier,
            &Settings::default(),
        )
    }

    pub fn new_with_settings(
        service: Arc<dyn EntityService>,
        cache: Arc<EntityCache>,
        address: Arc<AddressSync>,
        views: ViewSinks,
        notifier: Arc<dyn Notifier>,
        settings: &Settings,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(settings.event_buffer.max(1));
        let (outstanding, _) = watch::channel(0);
        Arc::new(Self {
            service,
            cache,
            address,
            views,
            notifier,
            notice_duration: settings.notice_duration(),
            state: Mutex::new(CoordinatorState::default()),
            events,
            outstanding,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    pub fn address(&self) -> &Arc<AddressSync> {
        &self.address
    }

    pub fn snapshot(&self) -> CoordinatorSnapshot {
        let state = self.state();
        CoordinatorSnapshot {
            is_loading: state.active.is_some(),
            active_source: state.active.as_ref().map(|active| active.request.source),
            current_id: state.current_id,
            pending_request: state.pending,
            cancel_requested: state
                .active
                .as_ref()
                .is_some_and(|active| active.cancel.load(Ordering::SeqCst)),
        }
    }

    pub fn current_id(&self) -> Option<EntityId> {
        self.state().current_id
    }

    /// Submits a load and returns immediately. Must be called from within a
    /// tokio runtime. Failures are reported through the notifier, never to
    /// the caller.
    pub fn load_and_display(self: &Arc<Self>, id: EntityId, source: Source) {
        let this = Arc::clone(self);
        self.spawn_tracked(async move {
            this.dispatch(LoadRequest::new(id, source)).await;
        });
    }

    pub fn handle_event(self: &Arc<Self>, event: EntityEvent) {
        match event {
            EntityEvent::Created { id } => self.load_and_display(id, Source::Create),
            EntityEvent::Updated { id } => self.load_and_display(id, Source::Update),
            EntityEvent::Deleted { id } => self.load_and_display(id, Source::DeleteCompleted),
        }
    }

    /// Drops the current selection after the user emptied the address:
    /// cancels whatever is loading, forgets the pending request, and hides the
    /// detail view.
    pub fn clear_selection(&self) {
        {
            let mut state = self.state();
            if let Some(active) = state.active.as_ref() {
                active.cancel.store(true, Ordering::SeqCst);
            }
            state.pending = None;
            state.current_id = None;
        }
        self.views.detail.clear();
        info!("coordinator: selection cleared");
        self.emit(CoordinatorEvent::SelectionCleared);
    }

    /// Resolves once nothing is active, pending, or waiting to be arbitrated.
    pub async fn settled(&self) {
        let mut outstanding = self.outstanding.subscribe();
        let _ = outstanding.wait_for(|count| *count == 0).await;
    }

    fn state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: CoordinatorEvent) {
        let _ = self.events.send(event);
    }

    fn spawn_tracked<F>(self: &Arc<Self>, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.outstanding.send_modify(|count| *count += 1);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            work.await;
            this.outstanding
                .send_modify(|count| *count = count.saturating_sub(1));
        });
    }

    async fn dispatch(self: Arc<Self>, request: LoadRequest) {
        if request.source == Source::DeleteCompleted {
            self.complete_delete(request.id);
            return;
        }

        match self.arbitrate(request) {
            Arbitration::Deferred => {}
            Arbitration::Start {
                ticket,
                predecessor,
            } => {
                if let Some(mut finished) = predecessor {
                    let _ = finished.wait_for(|done| *done).await;
                }
                self.run(request, ticket).await;
            }
        }
    }

    fn arbitrate(&self, request: LoadRequest) -> Arbitration {
        let mut state = self.state();
        let Some(active) = state.active.as_ref() else {
            return Arbitration::Start {
                ticket: state.claim(request),
                predecessor: None,
            };
        };

        if !request.source.outranks(active.request.source) {
            let replaced = state.pending.replace(request);
            match replaced {
                Some(dropped) => info!(
                    entity_id = request.id.0,
                    source = %request.source,
                    dropped_id = dropped.id.0,
                    dropped_source = %dropped.source,
                    "coordinator: deferred request replaced pending request"
                ),
                None => debug!(
                    entity_id = request.id.0,
                    source = %request.source,
                    "coordinator: deferred request behind active load"
                ),
            }
            self.emit(CoordinatorEvent::Deferred { request, replaced });
            return Arbitration::Deferred;
        }

        active.cancel.store(true, Ordering::SeqCst);
        let cancelled = active.request;
        let predecessor = active.finished.clone();
        info!(
            entity_id = request.id.0,
            source = %request.source,
            cancelled_id = cancelled.id.0,
            cancelled_source = %cancelled.source,
            "coordinator: preempting active load"
        );
        self.emit(CoordinatorEvent::Preempted {
            cancelled,
            by: request,
        });
        Arbitration::Start {
            ticket: state.claim(request),
            predecessor: Some(predecessor),
        }
    }

    async fn run(self: Arc<Self>, request: LoadRequest, ticket: LoadTicket) {
        let outcome = self.execute(request, &ticket).await;
        match outcome {
            LoadOutcome::Displayed(entity) => self.apply_success(request, entity),
            LoadOutcome::Cancelled(checkpoint) => {
                info!(
                    entity_id = request.id.0,
                    source = %request.source,
                    ?checkpoint,
                    "coordinator: load abandoned after cancellation"
                );
                self.emit(CoordinatorEvent::Cancelled {
                    request,
                    checkpoint,
                });
            }
            LoadOutcome::Failed(error) => self.apply_failure(request, error),
        }
        self.finish(ticket);
    }

    async fn execute(&self, request: LoadRequest, ticket: &LoadTicket) -> LoadOutcome {
        let LoadRequest { id, source } = request;
        if ticket.is_cancelled() {
            return LoadOutcome::Cancelled(Checkpoint::Handoff);
        }

        info!(entity_id = id.0, source = %source, "coordinator: load started");
        self.emit(CoordinatorEvent::Started(request));
        self.views.detail.set_loading(true);

        if source == Source::Direct {
            let exists = self.service.exists(id).await;
            if ticket.is_cancelled() {
                return LoadOutcome::Cancelled(Checkpoint::Validation);
            }
            match exists {
                Ok(true) => {}
                Ok(false) => return LoadOutcome::Failed(EntityError::NotFound(id)),
                Err(err) => return LoadOutcome::Failed(err),
            }
        } else if ticket.is_cancelled() {
            return LoadOutcome::Cancelled(Checkpoint::Validation);
        }

        let cached = match source {
            Source::Table => self.cache.get(id),
            Source::Create | Source::Update => {
                self.cache.invalidate(id);
                None
            }
            Source::Direct | Source::DeleteCompleted => None,
        };
        if ticket.is_cancelled() {
            return LoadOutcome::Cancelled(Checkpoint::CacheLookup);
        }

        let entity = match cached {
            Some(entity) => {
                debug!(entity_id = id.0, "coordinator: served from cache");
                entity
            }
            None => {
                let fetched = self.service.fetch(id).await;
                if ticket.is_cancelled() {
                    return LoadOutcome::Cancelled(Checkpoint::Fetch);
                }
                match fetched {
                    Ok(entity) => {
                        self.cache.set(id, entity.clone());
                        entity
                    }
                    Err(err) => return LoadOutcome::Failed(err),
                }
            }
        };

        if ticket.is_cancelled() {
            return LoadOutcome::Cancelled(Checkpoint::ViewUpdate);
        }
        LoadOutcome::Displayed(entity)
    }

    fn apply_success(&self, request: LoadRequest, entity: Entity) {
        let LoadRequest { id, source } = request;
        self.state().current_id = Some(id);

        if source.follows_save() {
            self.views.list.reload();
        }
        self.views.detail.render(&entity);
        self.views.list.highlight(id);

        match source {
            Source::Table | Source::Create | Source::Update => self.address.set_id(Some(id)),
            Source::Direct | Source::DeleteCompleted => {}
        }

        info!(entity_id = id.0, source = %source, "coordinator: entity displayed");
        self.emit(CoordinatorEvent::Displayed { request, entity });
    }

    fn apply_failure(&self, request: LoadRequest, error: EntityError) {
        warn!(
            entity_id = request.id.0,
            source = %request.source,
            "coordinator: load failed: {error}"
        );
        self.notifier.notify(Notice::new(
            NoticeLevel::Error,
            error.user_message(),
            self.notice_duration,
        ));

        // The mutation already landed remotely even though the reload failed.
        if request.source.follows_save() {
            self.views.list.reload();
        }
        if request.source == Source::Direct {
            self.state().current_id = None;
            self.address.set_id(None);
            self.views.detail.clear();
        }
        self.emit(CoordinatorEvent::Failed { request, error });
    }

    /// Releases the active slot if this load still owns it and promotes the
    /// pending request straight into it. A load that was preempted leaves
    /// both slots to its successor.
    fn finish(self: &Arc<Self>, ticket: LoadTicket) {
        let promoted = {
            let mut state = self.state();
            if !state.owns_active(&ticket) {
                drop(state);
                ticket.mark_finished();
                return;
            }
            state.active = None;
            match state.pending.take() {
                Some(next) => {
                    let next_ticket = state.claim(next);
                    Some((next, next_ticket))
                }
                None => None,
            }
        };
        ticket.mark_finished();
        self.views.detail.set_loading(false);

        match promoted {
            Some((next, next_ticket)) => {
                debug!(
                    entity_id = next.id.0,
                    source = %next.source,
                    "coordinator: running pending request"
                );
                let this = Arc::clone(self);
                self.spawn_tracked(async move {
                    this.run(next, next_ticket).await;
                });
            }
            None => self.emit(CoordinatorEvent::Idle),
        }
    }

    /// Delete completion never fetches: it drops any work for the deleted id,
    /// forgets its cache entry, clears the selection when the deleted entity
    /// was on screen, and reloads the list once.
    fn complete_delete(&self, id: EntityId) {
        let was_current = {
            let mut state = self.state();
            if let Some(active) = state.active.as_ref().filter(|active| active.request.id == id) {
                active.cancel.store(true, Ordering::SeqCst);
            }
            if state.pending.is_some_and(|pending| pending.id == id) {
                state.pending = None;
            }
            let was_current = state.current_id == Some(id);
            if was_current {
                state.current_id = None;
            }
            was_current
        };

        self.cache.invalidate(id);
        if was_current {
            self.address.set_id(None);
            self.views.detail.clear();
        }
        self.views.list.reload();

        info!(entity_id = id.0, was_current, "coordinator: delete completed");
        self.emit(CoordinatorEvent::DeleteCompleted { id, was_current });
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
