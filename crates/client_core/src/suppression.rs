//! Feedback-loop guard for programmatic address writes.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use shared::domain::EntityId;
use tokio::time::Instant;

pub const DEFAULT_SUPPRESSION_WINDOW: Duration = Duration::from_millis(100);

/// Remembers every id the coordinator wrote to the address within the last
/// interval and reports change notifications carrying any of those ids as
/// self-inflicted. Several writes can land before the listener sees the first
/// notification, so each write keeps its own deadline.
///
/// This is not a debounce: notifications for any other id pass through
/// immediately, and nothing is delayed.
pub struct SuppressionWindow {
    interval: Duration,
    armed: Mutex<VecDeque<ArmedWrite>>,
}

#[derive(Debug, Clone, Copy)]
struct ArmedWrite {
    id: Option<EntityId>,
    until: Instant,
}

impl SuppressionWindow {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            armed: Mutex::new(VecDeque::new()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Opens a window for a write of `id` (`None` is the empty address).
    pub fn arm(&self, id: Option<EntityId>) {
        let now = Instant::now();
        let mut armed = self.lock();
        prune(&mut armed, now);
        armed.push_back(ArmedWrite {
            id,
            until: now + self.interval,
        });
    }

    /// Whether a change notification for `id` should be swallowed.
    pub fn should_suppress(&self, id: Option<EntityId>) -> bool {
        let mut armed = self.lock();
        prune(&mut armed, Instant::now());
        armed.iter().any(|write| write.id == id)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ArmedWrite>> {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Deadlines are pushed in order, so expired writes sit at the front.
fn prune(armed: &mut VecDeque<ArmedWrite>, now: Instant) {
    while armed.front().is_some_and(|write| now >= write.until) {
        armed.pop_front();
    }
}

impl Default for SuppressionWindow {
    fn default() -> Self {
        Self::new(DEFAULT_SUPPRESSION_WINDOW)
    }
}

#[cfg(test)]
#[path = "tests/suppression_tests.rs"]
mod tests;
