//! Error taxonomy for the wallet layer.
//!
//! Every failure that reaches the UI is a `WalletError`. Each variant maps to
//! an [`ErrorCategory`] so callers can pick the right prompt (install link,
//! retry, manual network switch, generic failure) without matching on
//! message text.

use std::fmt;

use crate::contract::TransactionRecord;
use crate::wallet::{ProviderRpcError, codes};

/// Message category the UI branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InstallPrompt,
    PermissionDenied,
    NetworkMismatch,
    Generic,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WalletError {
    /// Requested provider id is not registered
    ProviderNotFound(String),
    /// The provider's native handler is absent from the host environment
    ProviderNotInstalled {
        provider_id: String,
        download_url: Option<String>,
    },
    /// The user declined a connection, switch or signature prompt
    UserRejected { provider_id: String, reason: String },
    /// Connected on the wrong chain and the automatic switch did not succeed
    NetworkSwitchRequired {
        provider_id: String,
        current_chain_id: u64,
        expected_chain_id: u64,
    },
    /// An explicit network switch failed
    NetworkSwitchFailed {
        provider_id: String,
        target_chain_id: u64,
        reason: String,
    },
    /// Connect failed for a reason none of the other kinds describe
    ConnectionUnknown { provider_id: String, reason: String },
    NoActiveSession,
    ReadFailure(String),
    WriteSubmitFailure(String),
    /// Submitted but the chain reverted or confirmation timed out.
    /// Carries the record in its final `failed` state.
    WriteConfirmFailure {
        record: Box<TransactionRecord>,
        reason: String,
    },
    InvalidRequest(String),
    InvalidTransition {
        hash: String,
        from: String,
        to: String,
    },
    Storage(String),
}

impl WalletError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            WalletError::ProviderNotInstalled { .. } => ErrorCategory::InstallPrompt,
            WalletError::UserRejected { .. } => ErrorCategory::PermissionDenied,
            WalletError::NetworkSwitchRequired { .. } | WalletError::NetworkSwitchFailed { .. } => {
                ErrorCategory::NetworkMismatch
            }
            _ => ErrorCategory::Generic,
        }
    }

    /// Classify a provider failure seen while connecting.
    pub fn from_connect_failure(
        provider_id: &str,
        download_url: Option<&str>,
        err: &ProviderRpcError,
    ) -> Self {
        if err.is_user_rejection() {
            return WalletError::UserRejected {
                provider_id: provider_id.to_string(),
                reason: err.message.clone(),
            };
        }

        let message = err.message.to_lowercase();
        if err.code == codes::DISCONNECTED || message.contains("not installed") {
            return WalletError::ProviderNotInstalled {
                provider_id: provider_id.to_string(),
                download_url: download_url.map(|s| s.to_string()),
            };
        }

        WalletError::ConnectionUnknown {
            provider_id: provider_id.to_string(),
            reason: err.to_string(),
        }
    }
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletError::ProviderNotFound(id) => write!(f, "Wallet provider '{}' is not registered", id),
            WalletError::ProviderNotInstalled { provider_id, download_url } => match download_url {
                Some(url) => write!(f, "Wallet '{}' is not installed. Get it at {}", provider_id, url),
                None => write!(f, "Wallet '{}' is not installed", provider_id),
            },
            WalletError::UserRejected { provider_id, reason } => {
                write!(f, "Request rejected in wallet '{}': {}", provider_id, reason)
            }
            WalletError::NetworkSwitchRequired { provider_id, current_chain_id, expected_chain_id } => write!(
                f,
                "Wallet '{}' is on chain {} but chain {} is required. Switch networks in the wallet.",
                provider_id, current_chain_id, expected_chain_id
            ),
            WalletError::NetworkSwitchFailed { provider_id, target_chain_id, reason } => write!(
                f,
                "Failed to switch wallet '{}' to chain {}: {}",
                provider_id, target_chain_id, reason
            ),
            WalletError::ConnectionUnknown { provider_id, reason } => {
                write!(f, "Failed to connect wallet '{}': {}", provider_id, reason)
            }
            WalletError::NoActiveSession => write!(f, "No wallet connected"),
            WalletError::ReadFailure(reason) => write!(f, "Contract read failed: {}", reason),
            WalletError::WriteSubmitFailure(reason) => write!(f, "Transaction submission failed: {}", reason),
            WalletError::WriteConfirmFailure { record, reason } => {
                write!(f, "Transaction {} failed: {}", record.hash, reason)
            }
            WalletError::InvalidRequest(reason) => write!(f, "Invalid request: {}", reason),
            WalletError::InvalidTransition { hash, from, to } => {
                write!(f, "Transaction {} cannot move from {} to {}", hash, from, to)
            }
            WalletError::Storage(reason) => write!(f, "Storage error: {}", reason),
        }
    }
}

impl std::error::Error for WalletError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_are_distinct_for_user_actionable_kinds() {
        let install = WalletError::ProviderNotInstalled {
            provider_id: "local-key".into(),
            download_url: Some("https://example.org".into()),
        };
        let rejected = WalletError::UserRejected { provider_id: "x".into(), reason: "no".into() };
        let mismatch = WalletError::NetworkSwitchRequired {
            provider_id: "x".into(),
            current_chain_id: 1,
            expected_chain_id: 137,
        };

        assert_eq!(install.category(), ErrorCategory::InstallPrompt);
        assert_eq!(rejected.category(), ErrorCategory::PermissionDenied);
        assert_eq!(mismatch.category(), ErrorCategory::NetworkMismatch);
        assert_eq!(WalletError::NoActiveSession.category(), ErrorCategory::Generic);
        assert_eq!(WalletError::ReadFailure("revert".into()).category(), ErrorCategory::Generic);
    }

    #[test]
    fn test_connect_failure_classification() {
        let rejected = ProviderRpcError::new(codes::USER_REJECTED, "User rejected the request.");
        assert!(matches!(
            WalletError::from_connect_failure("demo", None, &rejected),
            WalletError::UserRejected { .. }
        ));

        // Some wallets only signal rejection in the message
        let denied = ProviderRpcError::internal("MetaMask: User denied account authorization");
        assert!(matches!(
            WalletError::from_connect_failure("demo", None, &denied),
            WalletError::UserRejected { .. }
        ));

        let missing = ProviderRpcError::new(codes::DISCONNECTED, "handler unavailable");
        match WalletError::from_connect_failure("demo", Some("https://get.demo"), &missing) {
            WalletError::ProviderNotInstalled { download_url, .. } => {
                assert_eq!(download_url.as_deref(), Some("https://get.demo"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let other = ProviderRpcError::internal("socket hang up");
        assert!(matches!(
            WalletError::from_connect_failure("demo", None, &other),
            WalletError::ConnectionUnknown { .. }
        ));
    }
}
