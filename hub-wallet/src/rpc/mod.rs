//! Remote chain-RPC gateway
//!
//! Read-only calls and chain queries go through a [`ChainRpc`]: a
//! request/response function taking an action and positional parameters.
//! The high-level helpers (eth_call, fees, receipts...) are provided methods
//! so any transport only has to implement `request`.

mod http;

pub use http::{HttpChainRpc, JsonRpcTransport};

use async_trait::async_trait;
use ethers::types::{Address, U64, U256};
use serde::Deserialize;
use serde_json::{Value, json};
use strum::{AsRefStr, Display};

/// Actions the chain gateway understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
pub enum RpcAction {
    #[strum(serialize = "eth_call")]
    Call,
    #[strum(serialize = "eth_getCode")]
    GetCode,
    #[strum(serialize = "eth_getBalance")]
    GetBalance,
    #[strum(serialize = "eth_gasPrice")]
    GasPrice,
    #[strum(serialize = "eth_maxPriorityFeePerGas")]
    MaxPriorityFeePerGas,
    #[strum(serialize = "eth_estimateGas")]
    EstimateGas,
    #[strum(serialize = "eth_getTransactionCount")]
    GetTransactionCount,
    #[strum(serialize = "eth_sendRawTransaction")]
    SendRawTransaction,
    #[strum(serialize = "eth_getTransactionReceipt")]
    GetTransactionReceipt,
    #[strum(serialize = "eth_chainId")]
    ChainId,
}

/// Transaction receipt from eth_getTransactionReceipt
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub gas_used: Option<U256>,
    #[serde(default)]
    pub effective_gas_price: Option<U256>,
}

impl TransactionReceipt {
    /// Receipts without a status field predate EIP-658 and count as success
    pub fn succeeded(&self) -> bool {
        self.status.map(|s| !s.is_zero()).unwrap_or(true)
    }
}

/// Parse a hex quantity ("0x...") into U256
pub fn parse_quantity(value: &Value, what: &str) -> Result<U256, String> {
    let hex_str = value
        .as_str()
        .ok_or_else(|| format!("Invalid {} response: {}", what, value))?;
    U256::from_str_radix(hex_str.trim_start_matches("0x"), 16)
        .map_err(|e| format!("Failed to parse {}: {}", what, e))
}

fn parse_data(value: &Value, what: &str) -> Result<Vec<u8>, String> {
    let hex_str = value
        .as_str()
        .ok_or_else(|| format!("Invalid {} response: {}", what, value))?;
    hex::decode(hex_str.trim_start_matches("0x")).map_err(|e| format!("Failed to decode {}: {}", what, e))
}

#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn request(&self, action: RpcAction, params: Vec<Value>) -> Result<Value, String>;

    /// Read-only contract call, returns raw bytes
    async fn eth_call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, String> {
        let params = vec![
            json!({
                "to": format!("{:?}", to),
                "data": format!("0x{}", hex::encode(data)),
            }),
            json!("latest"),
        ];
        let result = self.request(RpcAction::Call, params).await?;
        parse_data(&result, "eth_call")
    }

    async fn get_code(&self, address: Address) -> Result<Vec<u8>, String> {
        let params = vec![json!(format!("{:?}", address)), json!("latest")];
        let result = self.request(RpcAction::GetCode, params).await?;
        parse_data(&result, "getCode")
    }

    /// Native balance in wei
    async fn get_balance(&self, address: Address) -> Result<U256, String> {
        let params = vec![json!(format!("{:?}", address)), json!("latest")];
        let result = self.request(RpcAction::GetBalance, params).await?;
        parse_quantity(&result, "balance")
    }

    async fn gas_price(&self) -> Result<U256, String> {
        let result = self.request(RpcAction::GasPrice, vec![]).await?;
        parse_quantity(&result, "gasPrice")
    }

    async fn estimate_gas(&self, from: Address, to: Address, data: &[u8], value: U256) -> Result<U256, String> {
        let params = vec![json!({
            "from": format!("{:?}", from),
            "to": format!("{:?}", to),
            "data": format!("0x{}", hex::encode(data)),
            "value": format!("0x{:x}", value),
        })];
        let result = self.request(RpcAction::EstimateGas, params).await?;
        parse_quantity(&result, "gas estimate")
    }

    /// (max_fee_per_gas, max_priority_fee_per_gas)
    async fn estimate_eip1559_fees(&self) -> Result<(U256, U256), String> {
        let gas_price = self.gas_price().await?;
        let priority_result = self.request(RpcAction::MaxPriorityFeePerGas, vec![]).await?;
        let priority_fee = parse_quantity(&priority_result, "maxPriorityFeePerGas")?;

        // Some RPC providers report priority fees far above the gas price
        let capped_priority_fee = std::cmp::min(priority_fee, gas_price);
        let max_fee = gas_price + gas_price / 10;

        log::debug!(
            "[rpc] Gas estimate: gas_price={}, priority_fee={} (capped from {}), max_fee={}",
            gas_price, capped_priority_fee, priority_fee, max_fee
        );

        Ok((max_fee, capped_priority_fee))
    }

    /// Pending nonce for an address
    async fn get_transaction_count(&self, address: Address) -> Result<U256, String> {
        let params = vec![json!(format!("{:?}", address)), json!("pending")];
        let result = self.request(RpcAction::GetTransactionCount, params).await?;
        parse_quantity(&result, "nonce")
    }

    /// Broadcast a signed transaction, returns the transaction hash
    async fn send_raw_transaction(&self, signed_tx: &[u8]) -> Result<String, String> {
        let params = vec![json!(format!("0x{}", hex::encode(signed_tx)))];
        let result = self.request(RpcAction::SendRawTransaction, params).await?;
        result
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| format!("Invalid sendRawTransaction response: {}", result))
    }

    async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>, String> {
        let result = self.request(RpcAction::GetTransactionReceipt, vec![json!(hash)]).await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .map_err(|e| format!("Failed to parse receipt: {}", e))
    }

    async fn chain_id(&self) -> Result<u64, String> {
        let result = self.request(RpcAction::ChainId, vec![]).await?;
        parse_quantity(&result, "chainId").map(|id| id.as_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChainRpc;

    #[test]
    fn test_action_names() {
        assert_eq!(RpcAction::Call.to_string(), "eth_call");
        assert_eq!(RpcAction::GetTransactionReceipt.as_ref(), "eth_getTransactionReceipt");
    }

    #[test]
    fn test_receipt_status() {
        let ok: TransactionReceipt =
            serde_json::from_value(json!({ "blockNumber": "0x2a", "gasUsed": "0x5208", "status": "0x1" })).unwrap();
        assert!(ok.succeeded());
        assert_eq!(ok.block_number.unwrap().as_u64(), 42);
        assert_eq!(ok.gas_used.unwrap(), U256::from(21000u64));

        let reverted: TransactionReceipt = serde_json::from_value(json!({ "status": "0x0" })).unwrap();
        assert!(!reverted.succeeded());
    }

    #[tokio::test]
    async fn test_fee_estimate_caps_priority_fee() {
        let rpc = MockChainRpc::new();
        rpc.respond(RpcAction::GasPrice, json!("0x64")); // 100
        rpc.respond(RpcAction::MaxPriorityFeePerGas, json!("0x3e8")); // 1000

        let (max_fee, priority) = rpc.estimate_eip1559_fees().await.unwrap();
        assert_eq!(max_fee, U256::from(110u64));
        assert_eq!(priority, U256::from(100u64));
    }

    #[tokio::test]
    async fn test_eth_call_and_null_receipt() {
        let rpc = MockChainRpc::new();
        rpc.respond(RpcAction::Call, json!("0x0000000000000000000000000000000000000000000000000000000000000001"));
        rpc.respond(RpcAction::GetTransactionReceipt, Value::Null);

        let to: Address = "0x0000000000000000000000000000000000000001".parse().unwrap();
        let out = rpc.eth_call(to, &[0x01, 0x02]).await.unwrap();
        assert_eq!(out.len(), 32);
        assert_eq!(out[31], 1);

        assert!(rpc.get_transaction_receipt("0xabc").await.unwrap().is_none());

        let calls = rpc.calls();
        assert_eq!(calls[0].0, RpcAction::Call);
        assert_eq!(calls[0].1[0]["data"], json!("0x0102"));
    }
}
