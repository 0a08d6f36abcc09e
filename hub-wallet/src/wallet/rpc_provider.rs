//! Node-managed wallet provider
//!
//! Accounts live in a JSON-RPC node (an unlocked dev node, a signer daemon,
//! a hardware bridge...). Requests are forwarded as-is. Nodes have no push
//! channel, so account and chain changes are detected by a polling watcher
//! that runs only while someone is subscribed.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{
    EventHandler, InjectedProvider, ListenerSet, ProviderEvent, ProviderRpcError, RpcMethod, SubscriptionId, codes,
    parse_accounts, parse_chain_id,
};
use crate::rpc::JsonRpcTransport;

/// JSON-RPC "method not found"
const METHOD_NOT_FOUND: i64 = -32601;

/// What the watcher saw on its last poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Snapshot {
    pub accounts: Vec<String>,
    pub chain_id: u64,
}

/// Events implied by moving from one snapshot to the next
pub(crate) fn diff_snapshot(prev: &Snapshot, next: &Snapshot) -> Vec<ProviderEvent> {
    let mut events = Vec::new();
    if prev.accounts != next.accounts {
        events.push(ProviderEvent::AccountsChanged(next.accounts.clone()));
    }
    if prev.chain_id != next.chain_id {
        events.push(ProviderEvent::ChainChanged(next.chain_id));
    }
    events
}

async fn fetch_snapshot(transport: &JsonRpcTransport) -> Result<Snapshot, ProviderRpcError> {
    let accounts = parse_accounts(&transport.call("eth_accounts", json!([])).await?)?;
    let chain_id = parse_chain_id(&transport.call("eth_chainId", json!([])).await?)?;
    Ok(Snapshot { accounts, chain_id })
}

async fn watch(transport: Arc<JsonRpcTransport>, listeners: Arc<ListenerSet>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    let mut last: Option<Snapshot> = None;

    loop {
        ticker.tick().await;
        match fetch_snapshot(&transport).await {
            Ok(next) => {
                if let Some(prev) = &last {
                    for event in diff_snapshot(prev, &next) {
                        log::debug!("[node_wallet] {} -> {:?}", transport.url(), event);
                        listeners.emit(&event);
                    }
                }
                last = Some(next);
            }
            Err(e) => {
                if last.take().is_some() {
                    log::warn!("[node_wallet] Lost {}: {}", transport.url(), e);
                    listeners.emit(&ProviderEvent::Disconnect);
                }
            }
        }
    }
}

pub struct NodeWalletProvider {
    transport: Arc<JsonRpcTransport>,
    listeners: Arc<ListenerSet>,
    poll_interval: Duration,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl NodeWalletProvider {
    pub fn new(url: &str, poll_interval: Duration) -> Result<Self, String> {
        Ok(Self {
            transport: Arc::new(JsonRpcTransport::new(url)?),
            listeners: Arc::new(ListenerSet::new()),
            poll_interval,
            watcher: Mutex::new(None),
        })
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }

    fn start_watcher(&self) {
        let mut watcher = self.watcher.lock();
        if watcher.is_some() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                log::debug!(
                    "[node_wallet] Watching {} every {:?}",
                    self.transport.url(),
                    self.poll_interval
                );
                *watcher = Some(handle.spawn(watch(
                    self.transport.clone(),
                    self.listeners.clone(),
                    self.poll_interval,
                )));
            }
            Err(_) => log::warn!("[node_wallet] No async runtime, change events disabled"),
        }
    }

    fn stop_watcher(&self) {
        if let Some(task) = self.watcher.lock().take() {
            task.abort();
        }
    }
}

impl Drop for NodeWalletProvider {
    fn drop(&mut self) {
        self.stop_watcher();
    }
}

#[async_trait]
impl InjectedProvider for NodeWalletProvider {
    async fn request(&self, method: RpcMethod) -> Result<Value, ProviderRpcError> {
        // Nodes expose their accounts without a permission prompt
        let name = match method {
            RpcMethod::RequestAccounts => "eth_accounts",
            ref other => other.name(),
        };
        self.transport.call(name, method.params()).await.map_err(|e| {
            if e.code == METHOD_NOT_FOUND {
                ProviderRpcError::new(codes::UNSUPPORTED_METHOD, e.message)
            } else {
                e
            }
        })
    }

    fn subscribe(&self, handler: EventHandler) -> SubscriptionId {
        let id = self.listeners.add(handler);
        self.start_watcher();
        id
    }

    fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        let removed = self.listeners.remove(id);
        if self.listeners.is_empty() {
            self.stop_watcher();
        }
        removed
    }

    fn kind(&self) -> &'static str {
        "node_wallet"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(accounts: &[&str], chain_id: u64) -> Snapshot {
        Snapshot {
            accounts: accounts.iter().map(|s| s.to_string()).collect(),
            chain_id,
        }
    }

    #[test]
    fn test_diff_snapshot() {
        let base = snapshot(&["0xa"], 137);
        assert!(diff_snapshot(&base, &base.clone()).is_empty());

        assert_eq!(
            diff_snapshot(&base, &snapshot(&["0xb", "0xa"], 137)),
            vec![ProviderEvent::AccountsChanged(vec!["0xb".into(), "0xa".into()])]
        );
        assert_eq!(
            diff_snapshot(&base, &snapshot(&[], 1)),
            vec![ProviderEvent::AccountsChanged(vec![]), ProviderEvent::ChainChanged(1)]
        );
    }

    #[tokio::test]
    async fn test_watcher_lives_while_subscribed() {
        let provider = NodeWalletProvider::new("http://127.0.0.1:9", Duration::from_millis(50)).unwrap();
        assert!(!provider.is_watching());

        let first = provider.subscribe(Arc::new(|_: &ProviderEvent| {}));
        let second = provider.subscribe(Arc::new(|_: &ProviderEvent| {}));
        assert!(provider.is_watching());

        assert!(provider.unsubscribe(&first));
        assert!(provider.is_watching());
        assert!(provider.unsubscribe(&second));
        assert!(!provider.is_watching());
        assert!(!provider.unsubscribe(&second));
    }
}
