//! Passive consumers driven by the coordinator, plus the user-initiated
//! callbacks the caller wires back into it.

use std::{sync::Arc, time::Duration};

use shared::domain::{Entity, EntityId, Source};
use tracing::warn;

use crate::{coordinator::RequestCoordinator, flows::EntityFlows};

pub trait DetailRenderer: Send + Sync {
    fn render(&self, entity: &Entity);
    fn set_loading(&self, loading: bool);
    /// Hides the detail view.
    fn clear(&self);
}

pub trait ListWidget: Send + Sync {
    fn reload(&self);
    fn highlight(&self, id: EntityId);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub duration: Duration,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>, duration: Duration) -> Self {
        Self {
            level,
            message: message.into(),
            duration,
        }
    }
}

/// User-visible toast sink.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

#[derive(Clone)]
pub struct ViewSinks {
    pub detail: Arc<dyn DetailRenderer>,
    pub list: Arc<dyn ListWidget>,
}

type IdCallback = Arc<dyn Fn(EntityId) + Send + Sync>;

/// Callbacks raised by the list and detail views. Views hold these instead of
/// talking to the coordinator or the remote service themselves.
#[derive(Clone)]
pub struct ViewCallbacks {
    pub on_row_activated: IdCallback,
    pub on_edit_requested: IdCallback,
    pub on_delete_requested: IdCallback,
}

impl ViewCallbacks {
    pub fn new(
        on_row_activated: impl Fn(EntityId) + Send + Sync + 'static,
        on_edit_requested: impl Fn(EntityId) + Send + Sync + 'static,
        on_delete_requested: impl Fn(EntityId) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_row_activated: Arc::new(on_row_activated),
            on_edit_requested: Arc::new(on_edit_requested),
            on_delete_requested: Arc::new(on_delete_requested),
        }
    }

    /// Default wiring: a row click becomes a `table` load, an edit request
    /// prefills `open_editor` from the cache-first lookup, and a confirmed
    /// delete runs the delete flow.
    pub fn wire(
        coordinator: Arc<RequestCoordinator>,
        flows: Arc<EntityFlows>,
        open_editor: impl Fn(Entity) + Send + Sync + 'static,
    ) -> Self {
        let open_editor = Arc::new(open_editor);
        let edit_flows = Arc::clone(&flows);
        Self::new(
            move |id| coordinator.load_and_display(id, Source::Table),
            move |id| {
                let flows = Arc::clone(&edit_flows);
                let open_editor = Arc::clone(&open_editor);
                tokio::spawn(async move {
                    match flows.load_for_edit(id).await {
                        Ok(entity) => open_editor(entity),
                        Err(err) => warn!(entity_id = id.0, "edit: prefill failed: {err}"),
                    }
                });
            },
            move |id| {
                let flows = Arc::clone(&flows);
                tokio::spawn(async move {
                    let _ = flows.delete(id).await;
                });
            },
        )
    }

    pub fn row_activated(&self, id: EntityId) {
        (self.on_row_activated)(id);
    }

    pub fn edit_requested(&self, id: EntityId) {
        (self.on_edit_requested)(id);
    }

    pub fn delete_requested(&self, id: EntityId) {
        (self.on_delete_requested)(id);
    }
}
