//! Local-key Wallet Provider
//!
//! Holds a private key in-process and acts as an injected provider on top of
//! it: transactions are built as EIP-1559, signed with ethers `LocalWallet`
//! and broadcast through the chain RPC of the currently active chain.

use async_trait::async_trait;
use dashmap::DashMap;
use ethers::core::k256::ecdsa::SigningKey;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip1559::Eip1559TransactionRequest;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::U256;
use parking_lot::RwLock;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{
    EventHandler, InjectedProvider, ListenerSet, ProviderEvent, ProviderRpcError, RpcMethod, SubscriptionId,
    TransactionRequest, codes,
};
use crate::catalog::ChainDirectory;
use crate::rpc::{ChainRpc, HttpChainRpc, RpcAction};

/// Builds the chain RPC for an endpoint URL
pub type RpcFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn ChainRpc>, String> + Send + Sync>;

fn http_rpc_factory() -> RpcFactory {
    Arc::new(|url: &str| HttpChainRpc::new(url).map(|rpc| Arc::new(rpc) as Arc<dyn ChainRpc>))
}

/// Parse a hex private key (with or without 0x) into a wallet
pub fn wallet_from_private_key(private_key: &str) -> Result<LocalWallet, String> {
    let key_hex = private_key.trim();
    let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

    let key_bytes = hex::decode(key_hex).map_err(|e| format!("Invalid private key hex: {}", e))?;
    if key_bytes.len() != 32 {
        return Err(format!("Invalid private key: expected 32 bytes, got {}", key_bytes.len()));
    }

    let signing_key =
        SigningKey::from_bytes(key_bytes.as_slice().into()).map_err(|e| format!("Invalid private key: {}", e))?;

    Ok(LocalWallet::from(signing_key))
}

pub struct LocalKeyProvider {
    wallet: LocalWallet,
    address: String,
    chains: RwLock<ChainDirectory>,
    chain_id: AtomicU64,
    listeners: ListenerSet,
    rpc_factory: RpcFactory,
    rpc_cache: DashMap<u64, Arc<dyn ChainRpc>>,
}

impl LocalKeyProvider {
    pub fn new(wallet: LocalWallet, chains: ChainDirectory, chain_id: u64) -> Self {
        let address = format!("{:?}", wallet.address()).to_lowercase();
        Self {
            wallet,
            address,
            chains: RwLock::new(chains),
            chain_id: AtomicU64::new(chain_id),
            listeners: ListenerSet::new(),
            rpc_factory: http_rpc_factory(),
            rpc_cache: DashMap::new(),
        }
    }

    pub fn from_private_key(private_key: &str, chains: ChainDirectory, chain_id: u64) -> Result<Self, String> {
        Ok(Self::new(wallet_from_private_key(private_key)?, chains, chain_id))
    }

    /// Replace how chain RPC clients are built
    pub fn with_rpc_factory(mut self, factory: RpcFactory) -> Self {
        self.rpc_factory = factory;
        self.rpc_cache.clear();
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id.load(Ordering::SeqCst)
    }

    fn rpc(&self) -> Result<Arc<dyn ChainRpc>, ProviderRpcError> {
        let chain_id = self.chain_id();
        if let Some(rpc) = self.rpc_cache.get(&chain_id) {
            return Ok(rpc.clone());
        }

        let url = self
            .chains
            .read()
            .rpc_url(chain_id)
            .map(|s| s.to_string())
            .ok_or_else(|| {
                ProviderRpcError::new(codes::CHAIN_DISCONNECTED, format!("No RPC endpoint for chain {}", chain_id))
            })?;
        let rpc = (self.rpc_factory)(&url).map_err(ProviderRpcError::internal)?;
        self.rpc_cache.insert(chain_id, rpc.clone());
        Ok(rpc)
    }

    fn switch_chain(&self, chain_id: u64) -> Result<Value, ProviderRpcError> {
        if !self.chains.read().contains(chain_id) {
            return Err(ProviderRpcError::new(
                codes::UNRECOGNIZED_CHAIN,
                format!("Unrecognized chain ID 0x{:x}. Try adding the chain first.", chain_id),
            ));
        }

        let previous = self.chain_id.swap(chain_id, Ordering::SeqCst);
        if previous != chain_id {
            log::info!("[local_key] Switched {} from chain {} to {}", self.address, previous, chain_id);
            self.listeners.emit(&ProviderEvent::ChainChanged(chain_id));
        }
        Ok(Value::Null)
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<Value, ProviderRpcError> {
        if request.from != self.wallet.address() {
            return Err(ProviderRpcError::new(
                codes::UNAUTHORIZED,
                format!("Account {:?} is not managed by this provider", request.from),
            ));
        }

        let rpc = self.rpc()?;
        let chain_id = self.chain_id();

        let nonce = rpc
            .get_transaction_count(request.from)
            .await
            .map_err(ProviderRpcError::internal)?;
        let gas = rpc
            .estimate_gas(request.from, request.to, &request.data, request.value)
            .await
            .map_err(ProviderRpcError::internal)?;
        let gas = gas * U256::from(120) / U256::from(100); // 20% buffer
        let (max_fee, priority_fee) = rpc.estimate_eip1559_fees().await.map_err(ProviderRpcError::internal)?;

        log::info!(
            "[local_key] Signing tx: to={:?}, value={}, data_len={} bytes, gas={}, nonce={} on chain {}",
            request.to,
            request.value,
            request.data.len(),
            gas,
            nonce,
            chain_id
        );

        let tx = Eip1559TransactionRequest::new()
            .from(request.from)
            .to(request.to)
            .value(request.value)
            .data(request.data)
            .nonce(nonce)
            .gas(gas)
            .max_fee_per_gas(max_fee)
            .max_priority_fee_per_gas(priority_fee)
            .chain_id(chain_id);

        let typed_tx: TypedTransaction = tx.into();
        let signature = self
            .wallet
            .sign_transaction(&typed_tx)
            .await
            .map_err(|e| ProviderRpcError::internal(format!("Failed to sign transaction: {}", e)))?;
        let signed_tx = typed_tx.rlp_signed(&signature);

        let hash = rpc.send_raw_transaction(&signed_tx).await.map_err(ProviderRpcError::internal)?;
        log::info!("[local_key] Broadcast {} on chain {}", hash, chain_id);
        Ok(json!(hash))
    }
}

#[async_trait]
impl InjectedProvider for LocalKeyProvider {
    async fn request(&self, method: RpcMethod) -> Result<Value, ProviderRpcError> {
        match method {
            RpcMethod::RequestAccounts | RpcMethod::Accounts => Ok(json!([self.address])),
            RpcMethod::ChainId => Ok(json!(format!("0x{:x}", self.chain_id()))),
            RpcMethod::SwitchChain { chain_id } => self.switch_chain(chain_id),
            RpcMethod::AddChain(params) => {
                log::info!("[local_key] Added chain {} ({})", params.chain_id, params.chain_name);
                self.rpc_cache.remove(&params.chain_id);
                self.chains.write().insert(params);
                Ok(Value::Null)
            }
            RpcMethod::SendTransaction(request) => self.send_transaction(request).await,
            RpcMethod::TransactionReceipt { hash } => {
                let rpc = self.rpc()?;
                let receipt = rpc
                    .request(RpcAction::GetTransactionReceipt, vec![json!(hash)])
                    .await
                    .map_err(ProviderRpcError::internal)?;
                Ok(receipt)
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
        "local_key"
    }
}
