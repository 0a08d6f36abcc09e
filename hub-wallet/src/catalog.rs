//! Static catalogs: chain directory and wallet provider entries
//!
//! Loaded from `config/chains.ron` and `config/wallet_providers.ron` at
//! startup. When a file is missing or fails to parse, the built-in defaults
//! are used so the hub still comes up.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::Path;

use crate::config::env_vars;
use crate::registry::ProviderCategory;

pub const CHAINS_FILE: &str = "chains.ron";
pub const PROVIDERS_FILE: &str = "wallet_providers.ron";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Network parameters, as used by `wallet_addEthereumChain` (EIP-3085)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    pub chain_id: u64,
    pub chain_name: String,
    pub rpc_urls: Vec<String>,
    pub native_currency: NativeCurrency,
    #[serde(default)]
    pub block_explorer_urls: Vec<String>,
}

impl ChainParams {
    pub fn to_eip3085(&self) -> Value {
        json!({
            "chainId": format!("0x{:x}", self.chain_id),
            "chainName": self.chain_name,
            "rpcUrls": self.rpc_urls,
            "nativeCurrency": {
                "name": self.native_currency.name,
                "symbol": self.native_currency.symbol,
                "decimals": self.native_currency.decimals,
            },
            "blockExplorerUrls": self.block_explorer_urls,
        })
    }

    pub fn from_eip3085(value: &Value) -> Result<Self, String> {
        let chain_id = value
            .get("chainId")
            .ok_or("Missing 'chainId'")
            .and_then(|v| crate::wallet::parse_chain_id(v).map_err(|_| "Invalid 'chainId'"))?;
        let chain_name = value
            .get("chainName")
            .and_then(|v| v.as_str())
            .ok_or("Missing 'chainName'")?
            .to_string();
        let strings = |key: &str| -> Vec<String> {
            value
                .get(key)
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect())
                .unwrap_or_default()
        };
        let rpc_urls = strings("rpcUrls");
        if rpc_urls.is_empty() {
            return Err("At least one entry in 'rpcUrls' is required".to_string());
        }
        let currency = value.get("nativeCurrency").ok_or("Missing 'nativeCurrency'")?;
        let native_currency = NativeCurrency {
            name: currency.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            symbol: currency
                .get("symbol")
                .and_then(|v| v.as_str())
                .ok_or("Missing 'nativeCurrency.symbol'")?
                .to_string(),
            decimals: currency.get("decimals").and_then(|v| v.as_u64()).unwrap_or(18) as u8,
        };

        Ok(Self {
            chain_id,
            chain_name,
            rpc_urls,
            native_currency,
            block_explorer_urls: strings("blockExplorerUrls"),
        })
    }
}

/// Known chains keyed by chain id
#[derive(Debug, Clone, Default)]
pub struct ChainDirectory {
    chains: HashMap<u64, ChainParams>,
}

impl ChainDirectory {
    pub fn new(chains: Vec<ChainParams>) -> Self {
        Self {
            chains: chains.into_iter().map(|c| (c.chain_id, c)).collect(),
        }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_chains())
    }

    pub fn get(&self, chain_id: u64) -> Option<&ChainParams> {
        self.chains.get(&chain_id)
    }

    /// First RPC URL for a chain
    pub fn rpc_url(&self, chain_id: u64) -> Option<&str> {
        self.chains
            .get(&chain_id)
            .and_then(|c| c.rpc_urls.first())
            .map(|s| s.as_str())
    }

    pub fn insert(&mut self, params: ChainParams) {
        self.chains.insert(params.chain_id, params);
    }

    pub fn chain_ids(&self) -> Vec<u64> {
        self.chains.keys().copied().collect()
    }

    pub fn contains(&self, chain_id: u64) -> bool {
        self.chains.contains_key(&chain_id)
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

fn builtin_chains() -> Vec<ChainParams> {
    let chain = |chain_id: u64, name: &str, rpc: &str, symbol: &str, explorer: &str| ChainParams {
        chain_id,
        chain_name: name.to_string(),
        rpc_urls: vec![rpc.to_string()],
        native_currency: NativeCurrency {
            name: symbol.to_string(),
            symbol: symbol.to_string(),
            decimals: 18,
        },
        block_explorer_urls: vec![explorer.to_string()],
    };
    vec![
        chain(137, "Polygon Mainnet", "https://polygon-rpc.com", "POL", "https://polygonscan.com"),
        chain(1, "Ethereum Mainnet", "https://eth.llamarpc.com", "ETH", "https://etherscan.io"),
        chain(8453, "Base", "https://mainnet.base.org", "ETH", "https://basescan.org"),
    ]
}

/// Load the chain directory from `chains.ron`, falling back to built-ins
pub fn load_chains(config_dir: &Path) -> ChainDirectory {
    let path = config_dir.join(CHAINS_FILE);
    if !path.exists() {
        log::info!("[catalog] {} not found, using built-in chains", path.display());
        return ChainDirectory::builtin();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match ron::from_str::<Vec<ChainParams>>(&content) {
            Ok(chains) => {
                log::info!("[catalog] Loaded {} chains from {}", chains.len(), path.display());
                ChainDirectory::new(chains)
            }
            Err(e) => {
                log::error!("[catalog] Failed to parse {}: {}", path.display(), e);
                ChainDirectory::builtin()
            }
        },
        Err(e) => {
            log::error!("[catalog] Failed to read {}: {}", path.display(), e);
            ChainDirectory::builtin()
        }
    }
}

/// Which adapter backs a catalog entry, and the environment keys it needs
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum HandlerSpec {
    LocalKey {
        key_env: String,
    },
    NodeRpc {
        url_env: String,
        #[serde(default)]
        poll_interval_ms: Option<u64>,
    },
    Keystore {
        url_env: String,
        tenant_env: String,
        token_env: String,
    },
}

impl HandlerSpec {
    /// Environment keys that must be present for the handler to be usable
    pub fn required_keys(&self) -> Vec<String> {
        match self {
            HandlerSpec::LocalKey { key_env } => vec![key_env.clone()],
            HandlerSpec::NodeRpc { url_env, .. } => vec![url_env.clone()],
            HandlerSpec::Keystore { url_env, tenant_env, token_env } => {
                vec![url_env.clone(), tenant_env.clone(), token_env.clone()]
            }
        }
    }
}

/// One wallet provider as described in `wallet_providers.ron`
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEntry {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub description: String,
    pub category: ProviderCategory,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub smart_account: bool,
    pub handler: HandlerSpec,
}

fn builtin_provider_entries() -> Vec<ProviderEntry> {
    vec![
        ProviderEntry {
            id: "local-key".to_string(),
            display_name: "Local Key".to_string(),
            icon: String::new(),
            description: "Private key held by this process".to_string(),
            category: ProviderCategory::Browser,
            download_url: None,
            smart_account: false,
            handler: HandlerSpec::LocalKey {
                key_env: env_vars::WALLET_PRIVATE_KEY.to_string(),
            },
        },
        ProviderEntry {
            id: "node-wallet".to_string(),
            display_name: "Node Wallet".to_string(),
            icon: String::new(),
            description: "Accounts managed by a JSON-RPC node".to_string(),
            category: ProviderCategory::Browser,
            download_url: None,
            smart_account: false,
            handler: HandlerSpec::NodeRpc {
                url_env: env_vars::NODE_WALLET_URL.to_string(),
                poll_interval_ms: None,
            },
        },
        ProviderEntry {
            id: "custodial-keystore".to_string(),
            display_name: "Custodial Keystore".to_string(),
            icon: String::new(),
            description: "Key issued by a managed keystore service".to_string(),
            category: ProviderCategory::Institutional,
            download_url: None,
            smart_account: false,
            handler: HandlerSpec::Keystore {
                url_env: env_vars::KEYSTORE_URL.to_string(),
                tenant_env: env_vars::KEYSTORE_TENANT_ID.to_string(),
                token_env: env_vars::KEYSTORE_TOKEN.to_string(),
            },
        },
    ]
}

/// Load provider entries from `wallet_providers.ron`, falling back to built-ins
pub fn load_provider_entries(config_dir: &Path) -> Vec<ProviderEntry> {
    let path = config_dir.join(PROVIDERS_FILE);
    if !path.exists() {
        log::info!("[catalog] {} not found, using built-in providers", path.display());
        return builtin_provider_entries();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match ron::from_str::<Vec<ProviderEntry>>(&content) {
            Ok(entries) => {
                log::info!("[catalog] Loaded {} wallet providers from {}", entries.len(), path.display());
                entries
            }
            Err(e) => {
                log::error!("[catalog] Failed to parse {}: {}", path.display(), e);
                builtin_provider_entries()
            }
        },
        Err(e) => {
            log::error!("[catalog] Failed to read {}: {}", path.display(), e);
            builtin_provider_entries()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files_fall_back_to_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let chains = load_chains(dir.path());
        assert!(chains.contains(137));
        assert_eq!(chains.rpc_url(8453), Some("https://mainnet.base.org"));

        let providers = load_provider_entries(dir.path());
        assert_eq!(providers.len(), 3);
        assert!(providers.iter().any(|p| p.id == "local-key"));
    }

    #[test]
    fn test_load_chains_from_ron() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CHAINS_FILE),
            r#"[
                (
                    chain_id: 31337,
                    chain_name: "Anvil",
                    rpc_urls: ["http://127.0.0.1:8545"],
                    native_currency: (name: "Ether", symbol: "ETH", decimals: 18),
                ),
            ]"#,
        )
        .unwrap();

        let chains = load_chains(dir.path());
        assert_eq!(chains.len(), 1);
        assert_eq!(chains.rpc_url(31337), Some("http://127.0.0.1:8545"));
        assert!(chains.get(31337).unwrap().block_explorer_urls.is_empty());
    }

    #[test]
    fn test_load_providers_from_ron() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PROVIDERS_FILE),
            r#"[
                (
                    id: "ledger-bridge",
                    display_name: "Ledger Bridge",
                    category: hardware,
                    download_url: Some("https://www.ledger.com/ledger-live"),
                    handler: NodeRpc(url_env: "LEDGER_BRIDGE_URL", poll_interval_ms: Some(500)),
                ),
            ]"#,
        )
        .unwrap();

        let entries = load_provider_entries(dir.path());
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.category, ProviderCategory::Hardware);
        assert!(!entry.smart_account);
        assert_eq!(entry.handler.required_keys(), vec!["LEDGER_BRIDGE_URL".to_string()]);
    }

    #[test]
    fn test_unparsable_providers_file_uses_builtins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PROVIDERS_FILE), "not ron at all [").unwrap();
        assert_eq!(load_provider_entries(dir.path()).len(), 3);
    }

    #[test]
    fn test_eip3085_round_trip() {
        let chains = ChainDirectory::builtin();
        let polygon = chains.get(137).unwrap();
        let parsed = ChainParams::from_eip3085(&polygon.to_eip3085()).unwrap();
        assert_eq!(&parsed, polygon);

        assert!(ChainParams::from_eip3085(&json!({ "chainId": "0x1", "chainName": "x" })).is_err());
    }
}
