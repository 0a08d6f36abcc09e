//! Event Bridge
//!
//! Relays a provider's change notifications into the session manager. One
//! subscription per session; it is removed when the session entry is dropped
//! (disconnect, replacement by a reconnect, or provider-initiated disconnect).

use std::sync::{Arc, Weak};

use super::ManagerInner;
use crate::wallet::{EventHandler, InjectedProvider, ProviderEvent, SubscriptionId};

pub(super) struct Subscription {
    handle: Arc<dyn InjectedProvider>,
    id: SubscriptionId,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.handle.unsubscribe(&self.id) {
            log::debug!("[bridge] Detached from {}", self.handle.kind());
        }
    }
}

pub(super) fn attach(
    manager: Weak<ManagerInner>,
    provider_id: String,
    generation: u64,
    handle: Arc<dyn InjectedProvider>,
) -> Subscription {
    log::debug!("[bridge] Attaching to '{}' ({})", provider_id, handle.kind());

    let handler: EventHandler = Arc::new(move |event: &ProviderEvent| match manager.upgrade() {
        Some(inner) => inner.apply_event(&provider_id, generation, event),
        None => log::debug!("[bridge] Manager gone, dropping {:?} for '{}'", event, provider_id),
    });
    let id = handle.subscribe(handler);

    Subscription { handle, id }
}
