//! Injected Provider Abstraction
//!
//! Every wallet integration is reached through the same narrow interface,
//! modelled on EIP-1193:
//!
//! - `request`: perform one of the supported [`RpcMethod`]s
//! - `subscribe` / `unsubscribe`: receive [`ProviderEvent`]s
//!
//! Concrete adapters:
//! - [`LocalKeyProvider`]: private key held in-process, signs locally and
//!   broadcasts through the chain RPC of its active chain
//! - [`NodeWalletProvider`]: accounts managed by a JSON-RPC node; requests
//!   are forwarded, changes are detected by polling
//! - keystore connector: fetches a custodial key, then drives a `LocalKeyProvider`

mod connector;
mod env_provider;
mod keystore_provider;
mod listeners;
mod rpc_provider;

pub use connector::{Handshake, ProviderConnector, create_connector, request_handshake};
pub use env_provider::LocalKeyProvider;
pub use keystore_provider::KeystoreConnector;
pub use listeners::{EventHandler, ListenerSet, SubscriptionId};
pub use rpc_provider::NodeWalletProvider;

use async_trait::async_trait;
use ethers::types::{Address, U256};
use serde_json::{Value, json};
use std::fmt;

use crate::catalog::ChainParams;

/// EIP-1193 provider error codes
pub mod codes {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    pub const DISCONNECTED: i64 = 4900;
    pub const CHAIN_DISCONNECTED: i64 = 4901;
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL: i64 = -32603;
}

/// Error returned by an injected provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRpcError {
    pub code: i64,
    pub message: String,
}

impl ProviderRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL, message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, message)
    }

    pub fn is_user_rejection(&self) -> bool {
        if self.code == codes::USER_REJECTED {
            return true;
        }
        let message = self.message.to_lowercase();
        message.contains("user rejected") || message.contains("user denied")
    }
}

impl fmt::Display for ProviderRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for ProviderRpcError {}

/// Call to be signed and broadcast by the wallet (`eth_sendTransaction`)
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub data: Vec<u8>,
    pub value: U256,
}

impl TransactionRequest {
    pub fn to_json(&self) -> Value {
        json!({
            "from": format!("{:?}", self.from),
            "to": format!("{:?}", self.to),
            "data": format!("0x{}", hex::encode(&self.data)),
            "value": format!("0x{:x}", self.value),
        })
    }

    pub fn from_json(value: &Value) -> Result<Self, ProviderRpcError> {
        let field = |name: &str| value.get(name).and_then(|v| v.as_str());

        let from = field("from")
            .ok_or_else(|| ProviderRpcError::invalid_params("Missing 'from'"))?
            .parse::<Address>()
            .map_err(|e| ProviderRpcError::invalid_params(format!("Invalid 'from': {}", e)))?;
        let to = field("to")
            .ok_or_else(|| ProviderRpcError::invalid_params("Missing 'to'"))?
            .parse::<Address>()
            .map_err(|e| ProviderRpcError::invalid_params(format!("Invalid 'to': {}", e)))?;
        let data = match field("data").or_else(|| field("input")) {
            Some(s) => hex::decode(s.trim_start_matches("0x"))
                .map_err(|e| ProviderRpcError::invalid_params(format!("Invalid 'data': {}", e)))?,
            None => Vec::new(),
        };
        let value = match field("value") {
            Some(s) => U256::from_str_radix(s.trim_start_matches("0x"), 16)
                .map_err(|e| ProviderRpcError::invalid_params(format!("Invalid 'value': {}", e)))?,
            None => U256::zero(),
        };

        Ok(Self { from, to, data, value })
    }
}

/// The closed set of methods the wallet layer sends to a provider
#[derive(Debug, Clone, PartialEq)]
pub enum RpcMethod {
    RequestAccounts,
    Accounts,
    ChainId,
    SwitchChain { chain_id: u64 },
    AddChain(ChainParams),
    SendTransaction(TransactionRequest),
    TransactionReceipt { hash: String },
}

impl RpcMethod {
    pub fn name(&self) -> &'static str {
        match self {
            RpcMethod::RequestAccounts => "eth_requestAccounts",
            RpcMethod::Accounts => "eth_accounts",
            RpcMethod::ChainId => "eth_chainId",
            RpcMethod::SwitchChain { .. } => "wallet_switchEthereumChain",
            RpcMethod::AddChain(_) => "wallet_addEthereumChain",
            RpcMethod::SendTransaction(_) => "eth_sendTransaction",
            RpcMethod::TransactionReceipt { .. } => "eth_getTransactionReceipt",
        }
    }

    /// Positional params as sent over EIP-1193 / JSON-RPC
    pub fn params(&self) -> Value {
        match self {
            RpcMethod::RequestAccounts | RpcMethod::Accounts | RpcMethod::ChainId => json!([]),
            RpcMethod::SwitchChain { chain_id } => json!([{ "chainId": format!("0x{:x}", chain_id) }]),
            RpcMethod::AddChain(params) => json!([params.to_eip3085()]),
            RpcMethod::SendTransaction(tx) => json!([tx.to_json()]),
            RpcMethod::TransactionReceipt { hash } => json!([hash]),
        }
    }

    /// Build a method from a raw request; unknown names fail with 4200.
    pub fn parse(name: &str, params: &Value) -> Result<Self, ProviderRpcError> {
        let first = params.get(0);
        match name {
            "eth_requestAccounts" => Ok(RpcMethod::RequestAccounts),
            "eth_accounts" => Ok(RpcMethod::Accounts),
            "eth_chainId" => Ok(RpcMethod::ChainId),
            "wallet_switchEthereumChain" => {
                let chain_id = first
                    .and_then(|p| p.get("chainId"))
                    .ok_or_else(|| ProviderRpcError::invalid_params("Missing 'chainId'"))?;
                Ok(RpcMethod::SwitchChain { chain_id: parse_chain_id(chain_id)? })
            }
            "wallet_addEthereumChain" => {
                let raw = first.ok_or_else(|| ProviderRpcError::invalid_params("Missing chain parameters"))?;
                let params = ChainParams::from_eip3085(raw).map_err(ProviderRpcError::invalid_params)?;
                Ok(RpcMethod::AddChain(params))
            }
            "eth_sendTransaction" => {
                let raw = first.ok_or_else(|| ProviderRpcError::invalid_params("Missing transaction"))?;
                Ok(RpcMethod::SendTransaction(TransactionRequest::from_json(raw)?))
            }
            "eth_getTransactionReceipt" => {
                let hash = first
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| ProviderRpcError::invalid_params("Missing transaction hash"))?;
                Ok(RpcMethod::TransactionReceipt { hash: hash.to_string() })
            }
            _ => Err(ProviderRpcError::new(
                codes::UNSUPPORTED_METHOD,
                format!("Unsupported method: {}", name),
            )),
        }
    }
}

/// Change notifications a provider pushes to its listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<String>),
    ChainChanged(u64),
    Disconnect,
}

/// Narrow EIP-1193 style interface every wallet adapter satisfies
#[async_trait]
pub trait InjectedProvider: Send + Sync {
    async fn request(&self, method: RpcMethod) -> Result<Value, ProviderRpcError>;

    fn subscribe(&self, handler: EventHandler) -> SubscriptionId;

    /// Returns false when the id was not subscribed
    fn unsubscribe(&self, id: &SubscriptionId) -> bool;

    /// Adapter name for logging
    fn kind(&self) -> &'static str;
}

/// Parse a chain id from either a hex string ("0x89"), decimal string or number
pub fn parse_chain_id(value: &Value) -> Result<u64, ProviderRpcError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| ProviderRpcError::invalid_params(format!("Invalid chain id: {}", n))),
        Value::String(s) => {
            let s = s.trim();
            let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex_part) => u64::from_str_radix(hex_part, 16),
                None => s.parse::<u64>(),
            };
            parsed.map_err(|_| ProviderRpcError::invalid_params(format!("Invalid chain id: {}", s)))
        }
        other => Err(ProviderRpcError::invalid_params(format!("Invalid chain id: {}", other))),
    }
}

/// Parse an `eth_accounts` / `eth_requestAccounts` result
pub fn parse_accounts(value: &Value) -> Result<Vec<String>, ProviderRpcError> {
    let arr = value
        .as_array()
        .ok_or_else(|| ProviderRpcError::internal(format!("Expected account list, got {}", value)))?;
    Ok(arr.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chain_id_formats() {
        assert_eq!(parse_chain_id(&json!("0x89")).unwrap(), 137);
        assert_eq!(parse_chain_id(&json!("137")).unwrap(), 137);
        assert_eq!(parse_chain_id(&json!(8453)).unwrap(), 8453);
        assert!(parse_chain_id(&json!("polygon")).is_err());
        assert!(parse_chain_id(&json!(null)).is_err());
    }

    #[test]
    fn test_switch_chain_params_are_hex() {
        let method = RpcMethod::SwitchChain { chain_id: 137 };
        assert_eq!(method.name(), "wallet_switchEthereumChain");
        assert_eq!(method.params(), json!([{ "chainId": "0x89" }]));
    }

    #[test]
    fn test_parse_rejects_unknown_methods() {
        let err = RpcMethod::parse("eth_sign", &json!([])).unwrap_err();
        assert_eq!(err.code, codes::UNSUPPORTED_METHOD);

        let parsed = RpcMethod::parse("wallet_switchEthereumChain", &json!([{ "chainId": "0x1" }])).unwrap();
        assert_eq!(parsed, RpcMethod::SwitchChain { chain_id: 1 });
    }

    #[test]
    fn test_send_transaction_round_trips_through_raw_request() {
        let tx = TransactionRequest {
            from: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".parse().unwrap(),
            to: "0x0000000000000000000000000000000000000001".parse().unwrap(),
            data: vec![0xa9, 0x05, 0x9c, 0xbb],
            value: U256::from(1_000u64),
        };
        let method = RpcMethod::SendTransaction(tx.clone());
        let parsed = RpcMethod::parse(method.name(), &method.params()).unwrap();
        assert_eq!(parsed, RpcMethod::SendTransaction(tx));
    }

    #[test]
    fn test_user_rejection_detection() {
        assert!(ProviderRpcError::new(codes::USER_REJECTED, "rejected").is_user_rejection());
        assert!(ProviderRpcError::internal("User denied transaction signature").is_user_rejection());
        assert!(!ProviderRpcError::new(codes::UNRECOGNIZED_CHAIN, "unknown chain").is_user_rejection());
    }
}
