// 📣 Notification Bus - in-process branch change broadcast
//
// Independent views subscribe to learn that branch-scoped data is stale.
// Delivery is fire-and-forget: no buffering of missed events, no acks.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Payload delivered to every listener after a branch change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchChanged {
    pub branch_id: String,
    /// Milliseconds since the Unix epoch; strictly increasing per registry
    pub timestamp: i64,
}

/// Handle returned by [`NotificationBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type Listener = Arc<dyn Fn(&BranchChanged) + Send + Sync>;

/// Observer list with explicit subscribe/unsubscribe
#[derive(Default)]
pub struct NotificationBus {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&BranchChanged) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Returns false if the subscription was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(sub, _)| *sub != id);
        listeners.len() != before
    }

    /// Deliver to every current listener; returns how many were called
    pub fn emit(&self, event: &BranchChanged) -> usize {
        // Snapshot so listeners may (un)subscribe from inside the callback
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        tracing::debug!(
            "Emitting branch change to {} listener(s): {}",
            listeners.len(),
            event.branch_id
        );
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Listener-side filter: drop deliveries that are not newer than the last one seen
#[derive(Debug)]
pub struct ChangeTracker {
    last_seen: AtomicI64,
}

impl Default for ChangeTracker {
    fn default() -> Self {
        ChangeTracker {
            last_seen: AtomicI64::new(i64::MIN),
        }
    }
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the event should be processed
    pub fn accept(&self, event: &BranchChanged) -> bool {
        self.last_seen.fetch_max(event.timestamp, Ordering::SeqCst) < event.timestamp
    }
}
