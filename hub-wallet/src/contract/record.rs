use chrono::{DateTime, Utc};
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

use crate::error::WalletError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Success,
    Failed,
}

impl TxStatus {
    /// Status only moves forward, out of pending, once
    pub fn can_transition_to(self, next: TxStatus) -> bool {
        self == TxStatus::Pending && next != TxStatus::Pending
    }

    pub fn is_final(self) -> bool {
        self != TxStatus::Pending
    }
}

/// A write call's persisted outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub hash: String,
    pub status: TxStatus,
    /// Signing account
    pub owner: String,
    pub contract_address: String,
    pub function_name: String,
    pub arguments: Vec<Value>,
    pub native_value_sent: U256,
    pub chain_id: u64,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// False when the store rejected this record or its final status
    pub persisted: bool,
}

/// Fields written by the single pending -> final transition
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionUpdate {
    pub status: TxStatus,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        hash: impl Into<String>,
        owner: impl Into<String>,
        contract_address: impl Into<String>,
        function_name: impl Into<String>,
        arguments: Vec<Value>,
        native_value_sent: U256,
        chain_id: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            hash: hash.into(),
            status: TxStatus::Pending,
            owner: owner.into(),
            contract_address: contract_address.into(),
            function_name: function_name.into(),
            arguments,
            native_value_sent,
            chain_id,
            block_number: None,
            gas_used: None,
            error: None,
            created_at: now,
            updated_at: now,
            persisted: false,
        }
    }

    fn transition(&mut self, next: TxStatus) -> Result<(), WalletError> {
        if !self.status.can_transition_to(next) {
            return Err(WalletError::InvalidTransition {
                hash: self.hash.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn as_update(&self) -> TransactionUpdate {
        TransactionUpdate {
            status: self.status,
            block_number: self.block_number,
            gas_used: self.gas_used,
            error: self.error.clone(),
            updated_at: self.updated_at,
        }
    }

    pub fn mark_success(&mut self, block_number: u64, gas_used: U256) -> Result<TransactionUpdate, WalletError> {
        self.transition(TxStatus::Success)?;
        self.block_number = Some(block_number);
        self.gas_used = Some(gas_used);
        Ok(self.as_update())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<TransactionUpdate, WalletError> {
        self.transition(TxStatus::Failed)?;
        self.error = Some(reason.into());
        Ok(self.as_update())
    }
}

/// Persistence collaborator for transaction records
pub trait TransactionStore: Send + Sync {
    fn insert(&self, record: &TransactionRecord) -> Result<(), String>;

    /// Apply the final transition. Implementations only touch pending rows.
    fn update(&self, hash: &str, update: &TransactionUpdate) -> Result<(), String>;
}
