//! Provider connectors
//!
//! A connector is what a registry descriptor calls to open a session: it
//! obtains a provider handle (building it from the catalog handler spec) and
//! runs the account/chain handshake on it.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{
    InjectedProvider, KeystoreConnector, LocalKeyProvider, NodeWalletProvider, ProviderRpcError, RpcMethod, codes,
    parse_accounts, parse_chain_id,
};
use crate::catalog::{ChainDirectory, HandlerSpec};
use crate::config::defaults;

/// Result of a successful provider handshake
#[derive(Clone)]
pub struct Handshake {
    pub handle: Arc<dyn InjectedProvider>,
    pub address: String,
    pub chain_id: u64,
    pub is_smart_account: bool,
}

impl std::fmt::Debug for Handshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handshake")
            .field("kind", &self.handle.kind())
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("is_smart_account", &self.is_smart_account)
            .finish()
    }
}

#[async_trait]
pub trait ProviderConnector: Send + Sync {
    async fn connect(&self) -> Result<Handshake, ProviderRpcError>;
}

/// Ask the provider for account access, then read its current chain.
/// An empty account list counts as unauthorized.
pub async fn request_handshake(
    handle: Arc<dyn InjectedProvider>,
    is_smart_account: bool,
) -> Result<Handshake, ProviderRpcError> {
    let accounts = parse_accounts(&handle.request(RpcMethod::RequestAccounts).await?)?;
    let address = accounts
        .into_iter()
        .next()
        .ok_or_else(|| ProviderRpcError::new(codes::UNAUTHORIZED, "Provider returned no accounts"))?;

    let chain_id = parse_chain_id(&handle.request(RpcMethod::ChainId).await?)?;

    log::debug!("[connector] {} handshake: {} on chain {}", handle.kind(), address, chain_id);
    Ok(Handshake {
        handle,
        address,
        chain_id,
        is_smart_account,
    })
}

/// Read a handler's environment key; absence means the handler is not installed
pub(super) fn read_handler_env(name: &str) -> Result<String, ProviderRpcError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ProviderRpcError::new(codes::DISCONNECTED, format!("Handler not installed: {} not set", name)))
}

/// Chain a freshly built local signer starts on
pub(super) fn initial_chain(chains: &ChainDirectory) -> u64 {
    if chains.contains(defaults::DEFAULT_CHAIN_ID) || chains.is_empty() {
        defaults::DEFAULT_CHAIN_ID
    } else {
        chains.chain_ids().into_iter().min().unwrap_or(defaults::DEFAULT_CHAIN_ID)
    }
}

struct LocalKeyConnector {
    key_env: String,
    chains: ChainDirectory,
    is_smart_account: bool,
}

#[async_trait]
impl ProviderConnector for LocalKeyConnector {
    async fn connect(&self) -> Result<Handshake, ProviderRpcError> {
        let key = read_handler_env(&self.key_env)?;
        let provider = LocalKeyProvider::from_private_key(&key, self.chains.clone(), initial_chain(&self.chains))
            .map_err(ProviderRpcError::internal)?;
        request_handshake(Arc::new(provider), self.is_smart_account).await
    }
}

struct NodeConnector {
    url_env: String,
    poll_interval: Duration,
    is_smart_account: bool,
}

#[async_trait]
impl ProviderConnector for NodeConnector {
    async fn connect(&self) -> Result<Handshake, ProviderRpcError> {
        let url = read_handler_env(&self.url_env)?;
        let provider = NodeWalletProvider::new(&url, self.poll_interval).map_err(ProviderRpcError::internal)?;
        request_handshake(Arc::new(provider), self.is_smart_account).await
    }
}

/// Create the connector for a catalog handler
pub fn create_connector(
    handler: &HandlerSpec,
    chains: &ChainDirectory,
    is_smart_account: bool,
) -> Arc<dyn ProviderConnector> {
    match handler {
        HandlerSpec::LocalKey { key_env } => Arc::new(LocalKeyConnector {
            key_env: key_env.clone(),
            chains: chains.clone(),
            is_smart_account,
        }),
        HandlerSpec::NodeRpc { url_env, poll_interval_ms } => Arc::new(NodeConnector {
            url_env: url_env.clone(),
            poll_interval: Duration::from_millis(poll_interval_ms.unwrap_or(defaults::NODE_POLL_MS)),
            is_smart_account,
        }),
        HandlerSpec::Keystore { url_env, tenant_env, token_env } => Arc::new(KeystoreConnector::new(
            url_env,
            tenant_env,
            token_env,
            chains.clone(),
            is_smart_account,
        )),
    }
}
