//! Connection Session Manager
//!
//! Owns the active session set. Every mutation (connect, disconnect, events
//! relayed by the bridge) goes through this type, and the session lock is
//! never held across a provider call: state is re-read after every await.
//!
//! Connects are coalesced per provider id. A second `connect` while one is
//! in flight awaits the same shared future instead of starting a second
//! handshake.

mod bridge;

use futures_util::future::{BoxFuture, FutureExt, Shared, join_all};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bridge::Subscription;

use crate::catalog::{ChainDirectory, ChainParams};
use crate::config::SwitchPolicy;
use crate::error::WalletError;
use crate::registry::{ProviderDescriptor, ProviderRegistry};
use crate::wallet::{Handshake, InjectedProvider, ProviderEvent, ProviderRpcError, RpcMethod, codes, parse_chain_id};

/// Live state produced by a successful provider handshake
#[derive(Clone)]
pub struct ConnectionSession {
    pub provider_id: String,
    pub address: String,
    pub chain_id: u64,
    /// Signs and broadcasts for this session only
    pub handle: Arc<dyn InjectedProvider>,
    pub is_smart_account: bool,
    pub connected: bool,
}

impl std::fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("provider_id", &self.provider_id)
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("kind", &self.handle.kind())
            .field("is_smart_account", &self.is_smart_account)
            .field("connected", &self.connected)
            .finish()
    }
}

/// Per-session result of `switch_network`
#[derive(Debug, Clone)]
pub struct SwitchOutcome {
    pub provider_id: String,
    /// The chain now active on success
    pub result: Result<u64, WalletError>,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Home network sessions are moved to right after connecting
    pub default_chain_id: u64,
    pub switch_policy: SwitchPolicy,
    /// Parameters offered to providers that do not know a chain yet
    pub chains: ChainDirectory,
}

impl SessionConfig {
    pub fn new(default_chain_id: u64, switch_policy: SwitchPolicy, chains: ChainDirectory) -> Self {
        Self {
            default_chain_id,
            switch_policy,
            chains,
        }
    }
}

struct SessionEntry {
    session: ConnectionSession,
    /// Distinguishes this session from earlier ones for the same provider
    generation: u64,
    _subscription: Subscription,
}

type ConnectFuture = Shared<BoxFuture<'static, Result<ConnectionSession, WalletError>>>;

struct ManagerInner {
    registry: Arc<ProviderRegistry>,
    config: SessionConfig,
    sessions: Mutex<HashMap<String, SessionEntry>>,
    in_flight: Mutex<HashMap<String, ConnectFuture>>,
    next_generation: AtomicU64,
}

/// Ask the provider to switch chains, adding the chain first when the
/// provider does not recognise it and parameters are known
async fn request_switch(
    handle: &Arc<dyn InjectedProvider>,
    chain_id: u64,
    params: Option<&ChainParams>,
) -> Result<(), ProviderRpcError> {
    match handle.request(RpcMethod::SwitchChain { chain_id }).await {
        Ok(_) => Ok(()),
        Err(e) if e.code == codes::UNRECOGNIZED_CHAIN => {
            let params = params.cloned().ok_or(e)?;
            log::info!("[session] Adding chain {} ({}) to {}", chain_id, params.chain_name, handle.kind());
            handle.request(RpcMethod::AddChain(params)).await?;
            handle.request(RpcMethod::SwitchChain { chain_id }).await.map(|_| ())
        }
        Err(e) => Err(e),
    }
}

impl ManagerInner {
    async fn establish(self: Arc<Self>, descriptor: Arc<ProviderDescriptor>) -> Result<ConnectionSession, WalletError> {
        let provider_id = descriptor.id.clone();
        log::info!("[session] Connecting to '{}'", provider_id);

        let handshake = descriptor.connect().await.map_err(|e| {
            let err = WalletError::from_connect_failure(&provider_id, descriptor.download_url.as_deref(), &e);
            log::error!("[session] Connect to '{}' failed: {}", provider_id, err);
            err
        })?;

        let chain_id = self.ensure_network(&provider_id, &handshake).await.map_err(|err| {
            log::error!("[session] Connect to '{}' failed: {}", provider_id, err);
            err
        })?;

        Ok(self.finalize(&provider_id, handshake, chain_id))
    }

    /// Switch a fresh handshake to the home network when policy asks for it
    async fn ensure_network(&self, provider_id: &str, handshake: &Handshake) -> Result<u64, WalletError> {
        let expected = self.config.default_chain_id;
        if handshake.chain_id == expected || !self.config.switch_policy.applies_to(provider_id) {
            return Ok(handshake.chain_id);
        }

        log::info!(
            "[session] '{}' is on chain {}, switching to {}",
            provider_id,
            handshake.chain_id,
            expected
        );

        let mismatch = || WalletError::NetworkSwitchRequired {
            provider_id: provider_id.to_string(),
            current_chain_id: handshake.chain_id,
            expected_chain_id: expected,
        };

        match request_switch(&handshake.handle, expected, self.config.chains.get(expected)).await {
            Ok(()) => {
                let actual = match handshake.handle.request(RpcMethod::ChainId).await {
                    Ok(value) => parse_chain_id(&value).unwrap_or(expected),
                    Err(_) => expected,
                };
                if actual == expected { Ok(actual) } else { Err(mismatch()) }
            }
            Err(e) if e.is_user_rejection() => Err(WalletError::UserRejected {
                provider_id: provider_id.to_string(),
                reason: e.message,
            }),
            Err(e) => {
                log::warn!("[session] Switch on '{}' failed: {}", provider_id, e);
                Err(mismatch())
            }
        }
    }

    fn finalize(self: &Arc<Self>, provider_id: &str, handshake: Handshake, chain_id: u64) -> ConnectionSession {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let session = ConnectionSession {
            provider_id: provider_id.to_string(),
            address: handshake.address,
            chain_id,
            handle: handshake.handle,
            is_smart_account: handshake.is_smart_account,
            connected: true,
        };

        let subscription = bridge::attach(
            Arc::downgrade(self),
            provider_id.to_string(),
            generation,
            session.handle.clone(),
        );
        let entry = SessionEntry {
            session: session.clone(),
            generation,
            _subscription: subscription,
        };

        let previous = self.sessions.lock().insert(provider_id.to_string(), entry);
        if previous.is_some() {
            log::info!("[session] Replaced existing session for '{}'", provider_id);
        }
        drop(previous);

        log::info!(
            "[session] Connected '{}': {} on chain {}",
            provider_id,
            session.address,
            session.chain_id
        );
        session
    }

    /// Apply a provider event to the session it was subscribed for. Events
    /// from an earlier session of the same provider are ignored.
    fn apply_event(&self, provider_id: &str, generation: u64, event: &ProviderEvent) {
        let removed = {
            let mut sessions = self.sessions.lock();
            if sessions.get(provider_id).map(|e| e.generation) != Some(generation) {
                log::warn!("[bridge] Ignoring stale {:?} for '{}'", event, provider_id);
                return;
            }

            match event {
                ProviderEvent::AccountsChanged(accounts) if accounts.is_empty() => sessions.remove(provider_id),
                ProviderEvent::Disconnect => sessions.remove(provider_id),
                ProviderEvent::AccountsChanged(accounts) => {
                    if let Some(entry) = sessions.get_mut(provider_id) {
                        log::debug!("[bridge] '{}' account -> {}", provider_id, accounts[0]);
                        entry.session.address = accounts[0].clone();
                    }
                    None
                }
                ProviderEvent::ChainChanged(chain_id) => {
                    if let Some(entry) = sessions.get_mut(provider_id) {
                        log::debug!("[bridge] '{}' chain -> {}", provider_id, chain_id);
                        entry.session.chain_id = *chain_id;
                    }
                    None
                }
            }
        };

        if let Some(entry) = removed {
            log::info!("[bridge] '{}' disconnected by provider ({:?})", provider_id, event);
            drop(entry);
        }
    }
}

/// Authoritative set of active wallet sessions. Cheap to clone; clones
/// share the same state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    pub fn new(registry: Arc<ProviderRegistry>, config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                registry,
                config,
                sessions: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.inner.registry
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Connect to a provider, replacing any existing session for it
    pub async fn connect(&self, provider_id: &str) -> Result<ConnectionSession, WalletError> {
        let attempt = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.get(provider_id) {
                Some(existing) => {
                    log::debug!("[session] Connect to '{}' already in progress, awaiting it", provider_id);
                    existing.clone()
                }
                None => {
                    let descriptor = self
                        .inner
                        .registry
                        .get(provider_id)
                        .ok_or_else(|| WalletError::ProviderNotFound(provider_id.to_string()))?;

                    if !self.inner.registry.is_installed(&descriptor) {
                        log::warn!("[session] Provider '{}' is not installed", provider_id);
                        return Err(WalletError::ProviderNotInstalled {
                            provider_id: provider_id.to_string(),
                            download_url: descriptor.download_url.clone(),
                        });
                    }

                    // The handshake runs as its own task so a caller that drops this
                    // future cannot strand the in-flight entry.
                    let inner = self.inner.clone();
                    let id = provider_id.to_string();
                    let task = tokio::spawn(async move {
                        let result = inner.clone().establish(descriptor).await;
                        inner.in_flight.lock().remove(&id);
                        result
                    });

                    let id = provider_id.to_string();
                    let attempt = task
                        .map(move |joined| {
                            joined.unwrap_or_else(|e| {
                                Err(WalletError::ConnectionUnknown {
                                    provider_id: id,
                                    reason: format!("Connect task failed: {}", e),
                                })
                            })
                        })
                        .boxed()
                        .shared();

                    in_flight.insert(provider_id.to_string(), attempt.clone());
                    attempt
                }
            }
        };

        attempt.await
    }

    pub fn is_connecting(&self, provider_id: &str) -> bool {
        self.inner.in_flight.lock().contains_key(provider_id)
    }

    /// Remove a session. Disconnecting an absent session is a no-op; returns
    /// whether a session was removed.
    pub fn disconnect(&self, provider_id: &str) -> bool {
        let removed = self.inner.sessions.lock().remove(provider_id);
        match removed {
            Some(entry) => {
                log::info!("[session] Disconnected '{}'", provider_id);
                drop(entry);
                true
            }
            None => false,
        }
    }

    pub fn disconnect_all(&self) {
        let drained: Vec<(String, SessionEntry)> = self.inner.sessions.lock().drain().collect();
        if !drained.is_empty() {
            log::info!("[session] Disconnected {} session(s)", drained.len());
        }
        drop(drained);
    }

    /// Switch one session (when `provider_id` is given) or every active
    /// session to `chain_id`. Never fails as a whole; each session reports
    /// its own outcome.
    pub async fn switch_network(&self, chain_id: u64, provider_id: Option<&str>) -> Vec<SwitchOutcome> {
        let targets: Vec<(ConnectionSession, u64)> = {
            let sessions = self.inner.sessions.lock();
            match provider_id {
                Some(id) => match sessions.get(id) {
                    Some(entry) => vec![(entry.session.clone(), entry.generation)],
                    None => {
                        return vec![SwitchOutcome {
                            provider_id: id.to_string(),
                            result: Err(WalletError::NoActiveSession),
                        }];
                    }
                },
                None => sessions.values().map(|e| (e.session.clone(), e.generation)).collect(),
            }
        };

        let params = self.inner.config.chains.get(chain_id).cloned();
        let attempts = targets.into_iter().map(|(session, generation)| {
            let inner = self.inner.clone();
            let params = params.clone();
            async move {
                let result = match request_switch(&session.handle, chain_id, params.as_ref()).await {
                    Ok(()) => {
                        inner.apply_event(&session.provider_id, generation, &ProviderEvent::ChainChanged(chain_id));
                        log::info!("[session] '{}' switched to chain {}", session.provider_id, chain_id);
                        Ok(chain_id)
                    }
                    Err(e) if e.is_user_rejection() => Err(WalletError::UserRejected {
                        provider_id: session.provider_id.clone(),
                        reason: e.message,
                    }),
                    Err(e) => {
                        log::error!("[session] '{}' failed to switch to {}: {}", session.provider_id, chain_id, e);
                        Err(WalletError::NetworkSwitchFailed {
                            provider_id: session.provider_id.clone(),
                            target_chain_id: chain_id,
                            reason: e.message,
                        })
                    }
                };
                SwitchOutcome {
                    provider_id: session.provider_id,
                    result,
                }
            }
        });

        join_all(attempts).await
    }

    pub fn list_sessions(&self) -> Vec<ConnectionSession> {
        self.inner.sessions.lock().values().map(|e| e.session.clone()).collect()
    }

    pub fn get_session(&self, provider_id: &str) -> Option<ConnectionSession> {
        self.inner.sessions.lock().get(provider_id).map(|e| e.session.clone())
    }

    /// Session that signs a write: the named provider's, otherwise the most
    /// recently connected one
    pub fn signer_session(&self, provider_id: Option<&str>) -> Option<ConnectionSession> {
        let sessions = self.inner.sessions.lock();
        match provider_id {
            Some(id) => sessions.get(id).map(|e| e.session.clone()),
            None => sessions
                .values()
                .max_by_key(|e| e.generation)
                .map(|e| e.session.clone()),
        }
    }
}
