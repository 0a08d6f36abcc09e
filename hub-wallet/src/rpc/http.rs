//! JSON-RPC over HTTP
//!
//! `JsonRpcTransport` keeps JSON-RPC error codes intact so provider adapters
//! can classify them; `HttpChainRpc` is the chain gateway built on top of it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::{ChainRpc, RpcAction};
use crate::wallet::{ProviderRpcError, codes};

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

pub struct JsonRpcTransport {
    http_client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcTransport {
    pub fn new(url: impl Into<String>) -> Result<Self, String> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            http_client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Make a JSON-RPC call. An unreachable endpoint maps to 4900, other
    /// transport failures to -32603. Errors returned by the endpoint keep
    /// their own code.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        log::debug!("[rpc] {} to {} with params: {}", method, self.url, request.params);

        let response = self
            .http_client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderRpcError::new(codes::DISCONNECTED, format!("RPC request to {} failed: {}", self.url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderRpcError::internal(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(ProviderRpcError::internal(format!(
                "RPC error ({}) from {}: {}",
                status,
                self.url,
                if body.is_empty() { "empty response" } else { &body }
            )));
        }

        let rpc_response: JsonRpcResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderRpcError::internal(format!("Failed to parse RPC response: {} - body: {}", e, body))
        })?;

        if let Some(error) = rpc_response.error {
            return Err(ProviderRpcError::new(error.code, error.message));
        }

        Ok(rpc_response.result.unwrap_or(Value::Null))
    }
}

/// Chain gateway speaking plain JSON-RPC 2.0
pub struct HttpChainRpc {
    transport: JsonRpcTransport,
}

impl HttpChainRpc {
    pub fn new(url: impl Into<String>) -> Result<Self, String> {
        Ok(Self {
            transport: JsonRpcTransport::new(url)?,
        })
    }

    pub fn url(&self) -> &str {
        self.transport.url()
    }
}

#[async_trait]
impl ChainRpc for HttpChainRpc {
    async fn request(&self, action: RpcAction, params: Vec<Value>) -> Result<Value, String> {
        self.transport
            .call(action.as_ref(), Value::Array(params))
            .await
            .map_err(|e| format!("RPC error {}: {}", e.code, e.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: "eth_chainId",
            params: Value::Array(vec![]),
            id: 7,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["method"], "eth_chainId");
        assert_eq!(json["id"], 7);
        assert_eq!(json["params"], serde_json::json!([]));
    }

    #[test]
    fn test_error_response_parsing() {
        let body = r#"{"jsonrpc":"2.0","id":1,"error":{"code":4902,"message":"Unrecognized chain ID"}}"#;
        let parsed: JsonRpcResponse = serde_json::from_str(body).unwrap();
        let error = parsed.error.unwrap();
        assert_eq!(error.code, 4902);
        assert!(parsed.result.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_disconnected() {
        let rpc = JsonRpcTransport::new("http://127.0.0.1:9").unwrap();
        let err = rpc.call("eth_chainId", Value::Array(vec![])).await.unwrap_err();
        assert_eq!(err.code, codes::DISCONNECTED);
    }
}
