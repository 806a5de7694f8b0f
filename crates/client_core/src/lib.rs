//! Entity-detail synchronization engine.
//!
//! A [`RequestCoordinator`] arbitrates load requests coming from the list
//! view, the address fragment, and the mutation flows, and keeps the
//! [`EntityCache`], the views, and the address consistent with whichever
//! request wins.

pub mod address;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod flows;
pub mod service;
pub mod suppression;
pub mod transport;
pub mod view;

use std::sync::Arc;

use shared::{
    domain::{Entity, Source},
    protocol::EntityEvent,
};
use tokio::{sync::broadcast, task::JoinHandle};

pub use address::{AddressStore, AddressSync, MemoryAddressStore};
pub use cache::{CacheEntry, EntityCache};
pub use config::Settings;
pub use coordinator::{Checkpoint, CoordinatorEvent, CoordinatorSnapshot, RequestCoordinator};
pub use error::EntityError;
pub use flows::EntityFlows;
pub use service::{EntityService, InMemoryEntityService};
pub use suppression::SuppressionWindow;
pub use transport::HttpEntityService;
pub use view::{DetailRenderer, ListWidget, Notice, NoticeLevel, Notifier, ViewCallbacks, ViewSinks};

/// Everything a page needs, built once at start-up and shared by reference.
pub struct EntityDetailApp {
    pub coordinator: Arc<RequestCoordinator>,
    pub flows: Arc<EntityFlows>,
    pub address: Arc<AddressSync>,
    pub cache: Arc<EntityCache>,
    tasks: Vec<JoinHandle<()>>,
}

impl EntityDetailApp {
    /// Wires the engine and starts the address listener and the event pump.
    /// A fragment already present in the address is loaded as a deep link.
    pub fn start(
        service: Arc<dyn EntityService>,
        store: Arc<dyn AddressStore>,
        views: ViewSinks,
        notifier: Arc<dyn Notifier>,
        settings: &Settings,
    ) -> Self {
        let cache = Arc::new(EntityCache::new());
        let address = Arc::new(AddressSync::new(
            store,
            SuppressionWindow::new(settings.suppression_window()),
        ));
        let coordinator = RequestCoordinator::new_with_settings(
            Arc::clone(&service),
            Arc::clone(&cache),
            Arc::clone(&address),
            views,
            Arc::clone(&notifier),
            settings,
        );
        let (events, _) = broadcast::channel::<EntityEvent>(settings.event_buffer.max(1));
        let flows = Arc::new(EntityFlows::new(
            service,
            Arc::clone(&cache),
            notifier,
            settings.notice_duration(),
            events,
        ));

        let tasks = vec![
            address.spawn_listener(Arc::clone(&coordinator)),
            flows::spawn_event_pump(flows.subscribe(), Arc::clone(&coordinator)),
        ];

        if let Some(id) = address.get_id() {
            coordinator.load_and_display(id, Source::Direct);
        }

        Self {
            coordinator,
            flows,
            address,
            cache,
            tasks,
        }
    }

    pub fn callbacks(
        &self,
        open_editor: impl Fn(Entity) + Send + Sync + 'static,
    ) -> ViewCallbacks {
        ViewCallbacks::wire(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.flows),
            open_editor,
        )
    }

    /// Stops the background listeners; called when the page goes away.
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
