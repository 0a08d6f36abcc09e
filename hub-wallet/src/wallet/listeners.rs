use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::ProviderEvent;

pub type EventHandler = Arc<dyn Fn(&ProviderEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Listener registry embedded by provider adapters
pub struct ListenerSet {
    handlers: DashMap<SubscriptionId, EventHandler>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    pub fn add(&self, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.handlers.insert(id, handler);
        log::debug!("Listener {} subscribed", id);
        id
    }

    pub fn remove(&self, id: &SubscriptionId) -> bool {
        let removed = self.handlers.remove(id).is_some();
        if removed {
            log::debug!("Listener {} unsubscribed", id);
        }
        removed
    }

    /// Deliver an event to every listener.
    ///
    /// Handlers are cloned out of the map first so a handler may unsubscribe
    /// itself (or others) while the event is being delivered.
    pub fn emit(&self, event: &ProviderEvent) {
        let handlers: Vec<EventHandler> = self.handlers.iter().map(|entry| entry.value().clone()).collect();
        for handler in handlers {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for ListenerSet {
    fn default() -> Self {
        Self::new()
    }
}
