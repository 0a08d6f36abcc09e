//! Contract Execution Gateway
//!
//! Reads go straight to the chain RPC and need no session. Writes are signed
//! by a session's provider, recorded as pending, then confirmed by polling
//! the receipt through the same provider:
//!
//! ```text
//! submit ──ok──> pending ──receipt status 1──> success
//!    │              └──revert / error / timeout──> failed
//!    └──err──> WriteSubmitFailure (no record)
//! ```

pub mod abi;
mod record;
pub mod units;

pub use record::{TransactionRecord, TransactionStore, TransactionUpdate, TxStatus};

use ethers::abi::{Abi, Function};
use ethers::types::{Address, U256};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use strum::{AsRefStr, Display};

use crate::config::defaults;
use crate::error::WalletError;
use crate::notify::Notifier;
use crate::rpc::{ChainRpc, TransactionReceipt};
use crate::session::{ConnectionSession, SessionManager};
use crate::wallet::{InjectedProvider, RpcMethod, TransactionRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum CallKind {
    Read,
    Write,
}

/// One contract invocation; built per call, never persisted itself
#[derive(Debug, Clone)]
pub struct ContractCallRequest {
    pub target_address: String,
    pub interface: Abi,
    pub function_name: String,
    pub arguments: Vec<Value>,
    /// Native amount in base units
    pub native_value: Option<U256>,
    pub kind: CallKind,
}

impl ContractCallRequest {
    pub fn read(target_address: impl Into<String>, interface: Abi, function_name: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            target_address: target_address.into(),
            interface,
            function_name: function_name.into(),
            arguments,
            native_value: None,
            kind: CallKind::Read,
        }
    }

    pub fn write(target_address: impl Into<String>, interface: Abi, function_name: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            kind: CallKind::Write,
            ..Self::read(target_address, interface, function_name, arguments)
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.native_value = Some(value);
        self
    }

    fn expect_kind(&self, kind: CallKind) -> Result<(), WalletError> {
        if self.kind != kind {
            return Err(WalletError::InvalidRequest(format!(
                "{} call passed to {}",
                self.kind, kind
            )));
        }
        Ok(())
    }

    fn function(&self) -> Result<&Function, WalletError> {
        abi::select_overload(&self.interface, &self.function_name, self.arguments.len())
            .map_err(WalletError::InvalidRequest)
    }

    fn target(&self) -> Result<Address, WalletError> {
        self.target_address
            .parse()
            .map_err(|_| WalletError::InvalidRequest(format!("Invalid contract address: {}", self.target_address)))
    }
}

pub struct ContractGateway {
    sessions: SessionManager,
    rpc: Arc<dyn ChainRpc>,
    store: Arc<dyn TransactionStore>,
    notifier: Arc<dyn Notifier>,
    confirm_timeout: Duration,
    poll_interval: Duration,
}

impl ContractGateway {
    pub fn new(
        sessions: SessionManager,
        rpc: Arc<dyn ChainRpc>,
        store: Arc<dyn TransactionStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            sessions,
            rpc,
            store,
            notifier,
            confirm_timeout: Duration::from_secs(defaults::CONFIRM_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(defaults::RECEIPT_POLL_MS),
        }
    }

    pub fn with_confirmation(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.confirm_timeout = timeout;
        self.poll_interval = poll_interval;
        self
    }

    /// Execute a read-only call. Failures are returned as-is, never retried.
    pub async fn read(&self, request: &ContractCallRequest) -> Result<Value, WalletError> {
        request.expect_kind(CallKind::Read)?;
        let function = request.function()?;
        let target = request.target()?;
        let calldata = abi::encode_call(function, &request.arguments).map_err(WalletError::InvalidRequest)?;

        log::debug!("[gateway] read {}.{} ({} bytes)", request.target_address, function.name, calldata.len());

        let output = self.rpc.eth_call(target, &calldata).await.map_err(|e| {
            log::error!("[gateway] read {}.{} failed: {}", request.target_address, function.name, e);
            WalletError::ReadFailure(e)
        })?;

        if output.is_empty() && !function.outputs.is_empty() {
            let code = self.rpc.get_code(target).await.map_err(WalletError::ReadFailure)?;
            let reason = if code.is_empty() {
                format!("{} is not a contract", request.target_address)
            } else {
                format!("{}.{} returned no data", request.target_address, function.name)
            };
            log::error!("[gateway] {}", reason);
            return Err(WalletError::ReadFailure(reason));
        }

        abi::decode_return(function, &output).map_err(WalletError::ReadFailure)
    }

    /// Sign, submit and confirm a state-changing call. The signer is the
    /// session of `provider_id`, or the most recently connected session.
    pub async fn write(
        &self,
        request: &ContractCallRequest,
        provider_id: Option<&str>,
    ) -> Result<TransactionRecord, WalletError> {
        request.expect_kind(CallKind::Write)?;
        let session = self.sessions.signer_session(provider_id).ok_or(WalletError::NoActiveSession)?;

        let function = request.function()?;
        let target = request.target()?;
        let calldata = abi::encode_call(function, &request.arguments).map_err(WalletError::InvalidRequest)?;
        let from: Address = session
            .address
            .parse()
            .map_err(|_| WalletError::InvalidRequest(format!("Invalid signer address: {}", session.address)))?;
        let value = request.native_value.unwrap_or_default();

        let hash = self
            .submit(&session, TransactionRequest { from, to: target, data: calldata, value })
            .await?;

        let mut record = TransactionRecord::pending(
            &hash,
            &session.address,
            &request.target_address,
            &request.function_name,
            request.arguments.clone(),
            value,
            session.chain_id,
        );
        match self.store.insert(&record) {
            Ok(()) => record.persisted = true,
            Err(e) => log::error!("[gateway] Submitted {} but could not persist it: {}", hash, e),
        }
        log::info!(
            "[gateway] Submitted {}.{} as {} via '{}'",
            request.target_address,
            request.function_name,
            hash,
            session.provider_id
        );

        let outcome = match self.await_receipt(&session.handle, &hash).await {
            Ok(receipt) if receipt.succeeded() => Ok(receipt),
            Ok(_) => Err("execution reverted".to_string()),
            Err(reason) => Err(reason),
        };

        let update = match &outcome {
            Ok(receipt) => record.mark_success(
                receipt.block_number.map(|n| n.as_u64()).unwrap_or_default(),
                receipt.gas_used.unwrap_or_default(),
            )?,
            Err(reason) => record.mark_failed(reason.clone())?,
        };
        if record.persisted {
            if let Err(e) = self.store.update(&hash, &update) {
                log::error!("[gateway] Could not persist final status of {}: {}", hash, e);
                record.persisted = false;
            }
        }

        match outcome {
            Ok(_) => {
                log::info!("[gateway] {} confirmed in block {:?}", hash, record.block_number);
                if let Err(e) = self.notifier.notify_success(&hash, &request.function_name) {
                    log::warn!("[gateway] Success notification for {} failed: {}", hash, e);
                }
                Ok(record)
            }
            Err(reason) => {
                log::error!("[gateway] {} failed: {}", hash, reason);
                if let Err(e) = self.notifier.notify_failure(&reason) {
                    log::warn!("[gateway] Failure notification for {} failed: {}", hash, e);
                }
                Err(WalletError::WriteConfirmFailure {
                    record: Box::new(record),
                    reason,
                })
            }
        }
    }

    async fn submit(&self, session: &ConnectionSession, tx: TransactionRequest) -> Result<String, WalletError> {
        let result = session
            .handle
            .request(RpcMethod::SendTransaction(tx))
            .await
            .map_err(|e| {
                log::error!("[gateway] Submit via '{}' failed: {}", session.provider_id, e);
                if e.is_user_rejection() {
                    WalletError::UserRejected {
                        provider_id: session.provider_id.clone(),
                        reason: e.message,
                    }
                } else {
                    WalletError::WriteSubmitFailure(e.to_string())
                }
            })?;

        result
            .as_str()
            .filter(|h| !h.is_empty())
            .map(|h| h.to_string())
            .ok_or_else(|| WalletError::WriteSubmitFailure(format!("Provider returned no transaction hash: {}", result)))
    }

    /// Poll for the receipt until it arrives, the provider errors, or the
    /// confirmation timeout elapses
    async fn await_receipt(&self, handle: &Arc<dyn InjectedProvider>, hash: &str) -> Result<TransactionReceipt, String> {
        let polling = async {
            loop {
                let response = handle
                    .request(RpcMethod::TransactionReceipt { hash: hash.to_string() })
                    .await
                    .map_err(|e| e.message)?;

                if !response.is_null() {
                    return serde_json::from_value(response).map_err(|e| format!("Failed to parse receipt: {}", e));
                }

                log::debug!("[gateway] Receipt for {} not yet available", hash);
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        // Bounds the whole wait, including a receipt request that never answers
        match tokio::time::timeout(self.confirm_timeout, polling).await {
            Ok(result) => result,
            Err(_) => Err(format!(
                "Timed out after {}ms waiting for confirmation",
                self.confirm_timeout.as_millis()
            )),
        }
    }
}
