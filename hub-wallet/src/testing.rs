//! Scripted collaborators shared by the unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::contract::{TransactionRecord, TransactionStore, TransactionUpdate};
use crate::notify::{Notifier, TxNotification};
use crate::rpc::{ChainRpc, RpcAction};
use crate::wallet::{
    EventHandler, Handshake, InjectedProvider, ListenerSet, ProviderConnector, ProviderEvent, ProviderRpcError,
    RpcMethod, SubscriptionId, codes, request_handshake,
};

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// In-memory injected provider with scripted answers
pub(crate) struct MockProvider {
    accounts: Mutex<Vec<String>>,
    chain_id: Mutex<u64>,
    known_chains: Mutex<HashSet<u64>>,
    switch_error: Mutex<Option<ProviderRpcError>>,
    send_result: Mutex<Result<Value, ProviderRpcError>>,
    receipt: Mutex<Result<Value, ProviderRpcError>>,
    stall_receipts: AtomicBool,
    listeners: ListenerSet,
    calls: Mutex<Vec<RpcMethod>>,
}

impl MockProvider {
    pub fn new(address: &str, chain_id: u64) -> Arc<Self> {
        Arc::new(Self {
            accounts: Mutex::new(vec![address.to_string()]),
            chain_id: Mutex::new(chain_id),
            known_chains: Mutex::new([1, 137, 8453, chain_id].into_iter().collect()),
            switch_error: Mutex::new(None),
            send_result: Mutex::new(Ok(json!("0xhash1"))),
            receipt: Mutex::new(Ok(json!({ "blockNumber": "0x1", "gasUsed": "0x5208", "status": "0x1" }))),
            stall_receipts: AtomicBool::new(false),
            listeners: ListenerSet::new(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_accounts(&self, accounts: Vec<String>) {
        *self.accounts.lock() = accounts;
    }

    pub fn forget_chain(&self, chain_id: u64) {
        self.known_chains.lock().remove(&chain_id);
    }

    pub fn set_switch_error(&self, error: Option<ProviderRpcError>) {
        *self.switch_error.lock() = error;
    }

    pub fn set_send_result(&self, result: Result<Value, ProviderRpcError>) {
        *self.send_result.lock() = result;
    }

    pub fn set_receipt(&self, result: Result<Value, ProviderRpcError>) {
        *self.receipt.lock() = result;
    }

    /// Receipt requests never answer while set
    pub fn stall_receipts(&self, stall: bool) {
        self.stall_receipts.store(stall, Ordering::SeqCst);
    }

    pub fn emit(&self, event: &ProviderEvent) {
        self.listeners.emit(event);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn calls(&self) -> Vec<RpcMethod> {
        self.calls.lock().clone()
    }

    pub fn method_names(&self) -> Vec<&'static str> {
        self.calls.lock().iter().map(|m| m.name()).collect()
    }
}

#[async_trait]
impl InjectedProvider for MockProvider {
    async fn request(&self, method: RpcMethod) -> Result<Value, ProviderRpcError> {
        self.calls.lock().push(method.clone());
        match method {
            RpcMethod::RequestAccounts | RpcMethod::Accounts => Ok(json!(self.accounts.lock().clone())),
            RpcMethod::ChainId => Ok(json!(format!("0x{:x}", *self.chain_id.lock()))),
            RpcMethod::SwitchChain { chain_id } => {
                if let Some(err) = self.switch_error.lock().clone() {
                    return Err(err);
                }
                if !self.known_chains.lock().contains(&chain_id) {
                    return Err(ProviderRpcError::new(codes::UNRECOGNIZED_CHAIN, "Unrecognized chain ID"));
                }
                let changed = {
                    let mut current = self.chain_id.lock();
                    let changed = *current != chain_id;
                    *current = chain_id;
                    changed
                };
                if changed {
                    self.listeners.emit(&ProviderEvent::ChainChanged(chain_id));
                }
                Ok(Value::Null)
            }
            RpcMethod::AddChain(params) => {
                self.known_chains.lock().insert(params.chain_id);
                Ok(Value::Null)
            }
            RpcMethod::SendTransaction(_) => self.send_result.lock().clone(),
            RpcMethod::TransactionReceipt { .. } => {
                if self.stall_receipts.load(Ordering::SeqCst) {
                    return futures_util::future::pending().await;
                }
                self.receipt.lock().clone()
            }
        }
    }

    fn subscribe(&self, handler: EventHandler) -> SubscriptionId {
        self.listeners.add(handler)
    }

    fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        self.listeners.remove(id)
    }

    fn kind(&self) -> &'static str {
        "mock"
    }
}

/// Connector handing out a fixed provider, counting handshakes
pub(crate) struct MockConnector {
    provider: Arc<MockProvider>,
    delay: Option<Duration>,
    failure: Option<ProviderRpcError>,
    handshakes: AtomicUsize,
}

impl MockConnector {
    pub fn new(provider: Arc<MockProvider>) -> Arc<Self> {
        Arc::new(Self {
            provider,
            delay: None,
            failure: None,
            handshakes: AtomicUsize::new(0),
        })
    }

    pub fn with_delay(provider: Arc<MockProvider>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            provider,
            delay: Some(delay),
            failure: None,
            handshakes: AtomicUsize::new(0),
        })
    }

    pub fn failing(provider: Arc<MockProvider>, error: ProviderRpcError) -> Arc<Self> {
        Arc::new(Self {
            provider,
            delay: None,
            failure: Some(error),
            handshakes: AtomicUsize::new(0),
        })
    }

    pub fn handshakes(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderConnector for MockConnector {
    async fn connect(&self) -> Result<Handshake, ProviderRpcError> {
        self.handshakes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        request_handshake(self.provider.clone(), false).await
    }
}

/// Chain RPC answering from a per-action script
pub(crate) struct MockChainRpc {
    responses: Mutex<HashMap<RpcAction, Result<Value, String>>>,
    calls: Mutex<Vec<(RpcAction, Vec<Value>)>>,
}

impl MockChainRpc {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(&self, action: RpcAction, value: Value) {
        self.responses.lock().insert(action, Ok(value));
    }

    pub fn fail(&self, action: RpcAction, message: &str) {
        self.responses.lock().insert(action, Err(message.to_string()));
    }

    pub fn calls(&self) -> Vec<(RpcAction, Vec<Value>)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ChainRpc for MockChainRpc {
    async fn request(&self, action: RpcAction, params: Vec<Value>) -> Result<Value, String> {
        self.calls.lock().push((action, params));
        self.responses
            .lock()
            .get(&action)
            .cloned()
            .unwrap_or_else(|| Err(format!("No response scripted for {}", action)))
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub events: Mutex<Vec<TxNotification>>,
}

impl Notifier for RecordingNotifier {
    fn notify_success(&self, hash: &str, kind: &str) -> Result<(), String> {
        self.events.lock().push(TxNotification::Confirmed {
            hash: hash.to_string(),
            kind: kind.to_string(),
        });
        Ok(())
    }

    fn notify_failure(&self, reason: &str) -> Result<(), String> {
        self.events.lock().push(TxNotification::Failed {
            reason: reason.to_string(),
        });
        Ok(())
    }
}

pub(crate) struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify_success(&self, _hash: &str, _kind: &str) -> Result<(), String> {
        Err("notification channel down".to_string())
    }

    fn notify_failure(&self, _reason: &str) -> Result<(), String> {
        Err("notification channel down".to_string())
    }
}

/// Store whose every write is refused
pub(crate) struct FailingStore;

impl TransactionStore for FailingStore {
    fn insert(&self, _record: &TransactionRecord) -> Result<(), String> {
        Err("database is locked".to_string())
    }

    fn update(&self, _hash: &str, _update: &TransactionUpdate) -> Result<(), String> {
        Err("database is locked".to_string())
    }
}
