//! Hub root: wires catalog, registry, sessions, storage and gateway together

use std::sync::Arc;

use crate::catalog::{load_chains, load_provider_entries};
use crate::config::Config;
use crate::contract::ContractGateway;
use crate::db::Database;
use crate::error::WalletError;
use crate::notify::ChannelNotifier;
use crate::registry::{ProcessEnvProbe, ProviderRegistry};
use crate::rpc::HttpChainRpc;
use crate::session::{SessionConfig, SessionManager};

pub struct WalletHub {
    config: Config,
    registry: Arc<ProviderRegistry>,
    sessions: SessionManager,
    db: Arc<Database>,
    notifier: Arc<ChannelNotifier>,
    gateway: ContractGateway,
}

impl WalletHub {
    pub fn from_env() -> Result<Self, WalletError> {
        Self::from_config(&Config::from_env())
    }

    pub fn from_config(config: &Config) -> Result<Self, WalletError> {
        let chains = load_chains(&config.config_dir);
        let entries = load_provider_entries(&config.config_dir);

        let registry = Arc::new(ProviderRegistry::from_entries(&entries, &chains, Arc::new(ProcessEnvProbe)));
        log::info!(
            "[hub] {} wallet providers registered, {} installed",
            registry.len(),
            registry.list_installed().len()
        );

        let rpc_url = config
            .rpc_url
            .clone()
            .or_else(|| chains.rpc_url(config.default_chain_id).map(String::from))
            .ok_or_else(|| {
                WalletError::InvalidRequest(format!("No RPC URL configured for chain {}", config.default_chain_id))
            })?;
        let rpc = Arc::new(HttpChainRpc::new(&rpc_url).map_err(WalletError::InvalidRequest)?);
        log::info!("[hub] Read calls go to {}", rpc_url);

        let sessions = SessionManager::new(
            registry.clone(),
            SessionConfig::new(config.default_chain_id, config.switch_policy.clone(), chains),
        );

        let db = Arc::new(Database::new(&config.database_url).map_err(|e| WalletError::Storage(e.to_string()))?);
        let notifier = Arc::new(ChannelNotifier::new());

        let gateway = ContractGateway::new(sessions.clone(), rpc, db.clone(), notifier.clone())
            .with_confirmation(config.confirm_timeout, config.receipt_poll_interval);

        Ok(Self {
            config: config.clone(),
            registry,
            sessions,
            db,
            notifier,
            gateway,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn gateway(&self) -> &ContractGateway {
        &self.gateway
    }

    /// Transaction history
    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Subscribe here to receive transaction outcomes
    pub fn notifier(&self) -> &Arc<ChannelNotifier> {
        &self.notifier
    }

    pub fn shutdown(&self) {
        self.sessions.disconnect_all();
        log::info!("[hub] Shut down");
    }
}
