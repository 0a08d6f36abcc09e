use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const CONFIG_DIR: &str = "HUB_CONFIG_DIR";
    pub const DATABASE_URL: &str = "HUB_DATABASE_URL";
    pub const RPC_URL: &str = "HUB_RPC_URL";
    pub const DEFAULT_CHAIN_ID: &str = "HUB_DEFAULT_CHAIN_ID";
    pub const SWITCH_ON_CONNECT: &str = "HUB_SWITCH_ON_CONNECT";
    pub const CONFIRM_TIMEOUT_SECS: &str = "HUB_CONFIRM_TIMEOUT_SECS";
    pub const RECEIPT_POLL_MS: &str = "HUB_RECEIPT_POLL_MS";
    // Wallet handlers (also the installation probes for the built-in catalog)
    pub const WALLET_PRIVATE_KEY: &str = "HUB_WALLET_PRIVATE_KEY";
    pub const NODE_WALLET_URL: &str = "HUB_NODE_WALLET_URL";
    pub const KEYSTORE_URL: &str = "HUB_KEYSTORE_URL";
    pub const KEYSTORE_TENANT_ID: &str = "HUB_KEYSTORE_TENANT_ID";
    pub const KEYSTORE_TOKEN: &str = "HUB_KEYSTORE_TOKEN";
}

/// Default values
pub mod defaults {
    pub const DATABASE_URL: &str = "./.db/hub_wallet.db";
    pub const DEFAULT_CHAIN_ID: u64 = 137;
    pub const CONFIRM_TIMEOUT_SECS: u64 = 180;
    pub const RECEIPT_POLL_MS: u64 = 2000;
    pub const NODE_POLL_MS: u64 = 4000;
}

/// Which providers attempt a switch to the default chain right after connecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchPolicy {
    All,
    Never,
    Only(HashSet<String>),
}

impl SwitchPolicy {
    /// `all`, `none` / `never`, or a comma-separated list of provider ids
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "" | "all" => SwitchPolicy::All,
            "none" | "never" => SwitchPolicy::Never,
            _ => SwitchPolicy::Only(
                value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
        }
    }

    pub fn applies_to(&self, provider_id: &str) -> bool {
        match self {
            SwitchPolicy::All => true,
            SwitchPolicy::Never => false,
            SwitchPolicy::Only(ids) => ids.contains(provider_id),
        }
    }
}

impl Default for SwitchPolicy {
    fn default() -> Self {
        SwitchPolicy::All
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                log::warn!("[config] Ignoring invalid {}='{}', using default", name, raw);
                default
            }
        },
        Err(_) => default,
    }
}

/// Locate the config directory: env override, then ./config, then ../config
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = env::var(env_vars::CONFIG_DIR) {
        return PathBuf::from(dir);
    }
    if Path::new("./config").exists() {
        PathBuf::from("./config")
    } else {
        PathBuf::from("../config")
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub config_dir: PathBuf,
    pub database_url: String,
    /// Read-call RPC endpoint; `None` means the default chain's public RPC
    pub rpc_url: Option<String>,
    pub default_chain_id: u64,
    pub switch_policy: SwitchPolicy,
    pub confirm_timeout: Duration,
    pub receipt_poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let switch_policy = env::var(env_vars::SWITCH_ON_CONNECT)
            .map(|v| SwitchPolicy::parse(&v))
            .unwrap_or_default();

        Self {
            config_dir: config_dir(),
            database_url: env::var(env_vars::DATABASE_URL)
                .unwrap_or_else(|_| defaults::DATABASE_URL.to_string()),
            rpc_url: env::var(env_vars::RPC_URL).ok().filter(|s| !s.is_empty()),
            default_chain_id: parse_env(env_vars::DEFAULT_CHAIN_ID, defaults::DEFAULT_CHAIN_ID),
            switch_policy,
            confirm_timeout: Duration::from_secs(parse_env(
                env_vars::CONFIRM_TIMEOUT_SECS,
                defaults::CONFIRM_TIMEOUT_SECS,
            )),
            receipt_poll_interval: Duration::from_millis(parse_env(
                env_vars::RECEIPT_POLL_MS,
                defaults::RECEIPT_POLL_MS,
            )),
        }
    }
}
