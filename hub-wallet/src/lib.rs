//! Wallet provider and contract execution layer
//!
//! - [`registry`]: catalog of wallet providers and their installation state
//! - [`session`]: one live connection per provider, kept in step with
//!   account and network changes the wallet reports
//! - [`contract`]: read calls against the chain and signed write calls with
//!   persisted outcomes
//! - [`hub`]: wires the above from [`config::Config`]

pub mod catalog;
pub mod config;
pub mod contract;
pub mod db;
pub mod error;
pub mod hub;
pub mod notify;
pub mod registry;
pub mod rpc;
pub mod session;
pub mod wallet;

#[cfg(test)]
mod testing;

pub use contract::{CallKind, ContractCallRequest, ContractGateway, TransactionRecord, TxStatus};
pub use error::{ErrorCategory, WalletError};
pub use hub::WalletHub;
pub use registry::{ProviderCategory, ProviderDescriptor, ProviderRegistry};
pub use session::{ConnectionSession, SessionManager};
