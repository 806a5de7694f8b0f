//! Two-way bridge between the navigable address fragment and the coordinator.

use std::sync::{Arc, Mutex, PoisonError};

use futures::{Stream, StreamExt};
use shared::domain::{EntityId, Source};
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::{coordinator::RequestCoordinator, suppression::SuppressionWindow};

/// Raw access to the address fragment, e.g. `#42`.
pub trait AddressStore: Send + Sync {
    fn fragment(&self) -> String;
    fn set_fragment(&self, fragment: &str);
    /// Emits the new fragment every time it actually changes.
    fn subscribe(&self) -> broadcast::Receiver<String>;
}

/// In-process address store. Writing the current value again is a no-op and
/// emits nothing, the way a browser skips `hashchange` for an unchanged hash.
pub struct MemoryAddressStore {
    fragment: Mutex<String>,
    changes: broadcast::Sender<String>,
}

impl MemoryAddressStore {
    pub fn new() -> Self {
        Self::with_fragment("")
    }

    pub fn with_fragment(initial: &str) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            fragment: Mutex::new(initial.to_string()),
            changes,
        }
    }
}

impl Default for MemoryAddressStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressStore for MemoryAddressStore {
    fn fragment(&self) -> String {
        self.fragment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_fragment(&self, fragment: &str) {
        {
            let mut current = self.fragment.lock().unwrap_or_else(PoisonError::into_inner);
            if *current == fragment {
                return;
            }
            *current = fragment.to_string();
        }
        let _ = self.changes.send(fragment.to_string());
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }
}

/// Parses a fragment into an entity id. Any non-negative integer selects an
/// entity; an empty, negative, or malformed fragment means nothing is selected.
pub fn parse_fragment(raw: &str) -> Option<EntityId> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix('#').unwrap_or(trimmed).trim();
    digits
        .parse::<i64>()
        .ok()
        .filter(|id| *id >= 0)
        .map(EntityId)
}

pub fn format_fragment(id: Option<EntityId>) -> String {
    match id {
        Some(id) => format!("#{}", id.0),
        None => String::new(),
    }
}

pub struct AddressSync {
    store: Arc<dyn AddressStore>,
    window: SuppressionWindow,
}

impl AddressSync {
    pub fn new(store: Arc<dyn AddressStore>, window: SuppressionWindow) -> Self {
        Self { store, window }
    }

    pub fn get_id(&self) -> Option<EntityId> {
        parse_fragment(&self.store.fragment())
    }

    /// Writes the address on behalf of the coordinator. The suppression window
    /// opens before the write so the resulting notification is recognised.
    pub fn set_id(&self, id: Option<EntityId>) {
        self.window.arm(id);
        self.store.set_fragment(&format_fragment(id));
    }

    pub fn suppression(&self) -> &SuppressionWindow {
        &self.window
    }

    /// Address changes that did not originate from [`AddressSync::set_id`].
    pub fn changes(self: &Arc<Self>) -> impl Stream<Item = Option<EntityId>> + Send + 'static {
        let this = Arc::clone(self);
        BroadcastStream::new(self.store.subscribe()).filter_map(move |item| {
            let this = Arc::clone(&this);
            async move {
                let fragment = match item {
                    Ok(fragment) => fragment,
                    Err(err) => {
                        warn!("address: change notifications lagged: {err}");
                        return None;
                    }
                };
                let id = parse_fragment(&fragment);
                if this.window.should_suppress(id) {
                    debug!(fragment = %fragment, "address: suppressed self-inflicted change");
                    return None;
                }
                Some(id)
            }
        })
    }

    /// Runs `callback` for every unsuppressed change until the store goes away.
    pub fn on_change<F>(self: &Arc<Self>, callback: F) -> JoinHandle<()>
    where
        F: Fn(Option<EntityId>) + Send + Sync + 'static,
    {
        let changes = self.changes();
        tokio::spawn(async move {
            futures::pin_mut!(changes);
            while let Some(id) = changes.next().await {
                callback(id);
            }
        })
    }

    /// Deep links become `direct` loads; an emptied address clears the
    /// current selection.
    pub fn spawn_listener(self: &Arc<Self>, coordinator: Arc<RequestCoordinator>) -> JoinHandle<()> {
        self.on_change(move |id| match id {
            Some(id) => coordinator.load_and_display(id, Source::Direct),
            None => coordinator.clear_selection(),
        })
    }
}

#[cfg(test)]
#[path = "tests/address_tests.rs"]
mod tests;
