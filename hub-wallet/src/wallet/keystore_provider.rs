//! Custodial keystore connector
//!
//! Fetches the signing key for this instance from a managed keystore service,
//! then drives a [`LocalKeyProvider`] with it. Three environment keys are
//! named by the catalog entry: the keystore URL, the tenant id and the
//! instance token.

use async_trait::async_trait;
use ethers::signers::LocalWallet;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::connector::{initial_chain, read_handler_env};
use super::env_provider::wallet_from_private_key;
use super::{Handshake, LocalKeyProvider, ProviderConnector, ProviderRpcError, codes, request_handshake};
use crate::catalog::ChainDirectory;

/// Response from the keystore API
#[derive(Debug, Deserialize)]
struct KeystoreResponse {
    private_key: String,
    admin_address: String,
}

/// A usable key is exactly 32 bytes of hex. Anything else is most likely an
/// encrypted export the service should not have handed out.
fn validate_key(private_key: &str) -> Result<&str, String> {
    let key_hex = private_key.strip_prefix("0x").unwrap_or(private_key);
    if key_hex.len() != 64 || !key_hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err("Keystore returned an encrypted or invalid private key. \
             Configure the keystore to issue raw server-wallet keys."
            .to_string());
    }
    Ok(key_hex)
}

pub struct KeystoreConnector {
    url_env: String,
    tenant_env: String,
    token_env: String,
    chains: ChainDirectory,
    is_smart_account: bool,
    http_client: reqwest::Client,
    /// Fetched on first connect, dropped by `refresh`
    cached_wallet: RwLock<Option<LocalWallet>>,
}

impl KeystoreConnector {
    pub fn new(
        url_env: &str,
        tenant_env: &str,
        token_env: &str,
        chains: ChainDirectory,
        is_smart_account: bool,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            url_env: url_env.to_string(),
            tenant_env: tenant_env.to_string(),
            token_env: token_env.to_string(),
            chains,
            is_smart_account,
            http_client,
            cached_wallet: RwLock::new(None),
        }
    }

    async fn fetch_wallet(&self) -> Result<LocalWallet, ProviderRpcError> {
        let keystore_url = read_handler_env(&self.url_env)?;
        let tenant_id = read_handler_env(&self.tenant_env)?;
        let instance_token = read_handler_env(&self.token_env)?;

        let url = format!("{}/api/keystore/wallet", keystore_url.trim_end_matches('/'));
        log::debug!("[keystore] Fetching wallet from {}", url);

        let response = self
            .http_client
            .get(&url)
            .header("X-Tenant-ID", tenant_id)
            .header("X-Instance-Token", instance_token)
            .send()
            .await
            .map_err(|e| ProviderRpcError::new(codes::DISCONNECTED, format!("Keystore request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let code = if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
                codes::UNAUTHORIZED
            } else {
                codes::INTERNAL
            };
            return Err(ProviderRpcError::new(code, format!("Keystore error ({}): {}", status, body)));
        }

        let data: KeystoreResponse = response
            .json()
            .await
            .map_err(|e| ProviderRpcError::internal(format!("Failed to parse keystore response: {}", e)))?;

        let key_hex = validate_key(&data.private_key).map_err(ProviderRpcError::internal)?;
        let wallet = wallet_from_private_key(key_hex).map_err(ProviderRpcError::internal)?;

        log::info!("[keystore] Fetched wallet {}", data.admin_address);
        Ok(wallet)
    }

    async fn wallet(&self) -> Result<LocalWallet, ProviderRpcError> {
        {
            let cache = self.cached_wallet.read().await;
            if let Some(wallet) = cache.as_ref() {
                return Ok(wallet.clone());
            }
        }

        let wallet = self.fetch_wallet().await?;
        *self.cached_wallet.write().await = Some(wallet.clone());
        Ok(wallet)
    }

    /// Forget the cached key; the next connect fetches it again
    pub async fn refresh(&self) {
        log::info!("[keystore] Dropping cached wallet");
        *self.cached_wallet.write().await = None;
    }
}

#[async_trait]
impl ProviderConnector for KeystoreConnector {
    async fn connect(&self) -> Result<Handshake, ProviderRpcError> {
        let wallet = self.wallet().await?;
        let provider = LocalKeyProvider::new(wallet, self.chains.clone(), initial_chain(&self.chains));
        request_handshake(Arc::new(provider), self.is_smart_account).await
    }
}
