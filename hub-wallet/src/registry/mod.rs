//! Provider Registry
//!
//! Catalog of wallet providers keyed by id. Built once by the composition
//! root, then shared read-only behind an `Arc`.

mod probe;

pub use probe::{EnvironmentProbe, ProcessEnvProbe, StaticProbe};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use strum::{AsRefStr, Display, EnumString};

use crate::catalog::{ChainDirectory, ProviderEntry};
use crate::wallet::{Handshake, ProviderConnector, ProviderRpcError, create_connector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProviderCategory {
    Browser,
    Mobile,
    Hardware,
    Social,
    Institutional,
}

type InstallPredicate = dyn Fn(&dyn EnvironmentProbe) -> bool + Send + Sync;

/// Predicate over the host environment telling whether a provider's native
/// handler is currently present
#[derive(Clone)]
pub struct InstallationCheck(Arc<InstallPredicate>);

impl InstallationCheck {
    pub fn always() -> Self {
        Self(Arc::new(|_: &dyn EnvironmentProbe| true))
    }

    /// Installed when every key is available in the probe
    pub fn requires(keys: Vec<String>) -> Self {
        Self(Arc::new(move |probe: &dyn EnvironmentProbe| keys.iter().all(|k| probe.is_available(k))))
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&dyn EnvironmentProbe) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    pub fn evaluate(&self, probe: &dyn EnvironmentProbe) -> bool {
        (self.0)(probe)
    }
}

impl std::fmt::Debug for InstallationCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("InstallationCheck(..)")
    }
}

pub struct ProviderDescriptor {
    pub id: String,
    pub display_name: String,
    pub icon: String,
    pub description: String,
    pub category: ProviderCategory,
    /// Offered to the user when the installation check fails
    pub download_url: Option<String>,
    installation: InstallationCheck,
    connector: Arc<dyn ProviderConnector>,
}

impl ProviderDescriptor {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        category: ProviderCategory,
        connector: Arc<dyn ProviderConnector>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            icon: String::new(),
            description: String::new(),
            category,
            download_url: None,
            installation: InstallationCheck::always(),
            connector,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = Some(url.into());
        self
    }

    pub fn with_installation_check(mut self, check: InstallationCheck) -> Self {
        self.installation = check;
        self
    }

    /// Build a descriptor from a catalog entry; installation is probed on
    /// the handler's required environment keys
    pub fn from_entry(entry: &ProviderEntry, chains: &ChainDirectory) -> Self {
        let connector = create_connector(&entry.handler, chains, entry.smart_account);
        let mut descriptor = Self::new(&entry.id, &entry.display_name, entry.category, connector)
            .with_icon(&entry.icon)
            .with_description(&entry.description)
            .with_installation_check(InstallationCheck::requires(entry.handler.required_keys()));
        descriptor.download_url = entry.download_url.clone();
        descriptor
    }

    pub fn is_installed(&self, probe: &dyn EnvironmentProbe) -> bool {
        self.installation.evaluate(probe)
    }

    /// Negotiate a session with this provider
    pub async fn connect(&self) -> Result<Handshake, ProviderRpcError> {
        self.connector.connect().await
    }
}

impl std::fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("category", &self.category)
            .field("download_url", &self.download_url)
            .finish()
    }
}

/// Registry that holds all available wallet providers
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<ProviderDescriptor>>,
    probe: Arc<dyn EnvironmentProbe>,
}

impl ProviderRegistry {
    pub fn new(probe: Arc<dyn EnvironmentProbe>) -> Self {
        Self {
            providers: HashMap::new(),
            probe,
        }
    }

    pub fn from_entries(
        entries: &[ProviderEntry],
        chains: &ChainDirectory,
        probe: Arc<dyn EnvironmentProbe>,
    ) -> Self {
        let mut registry = Self::new(probe);
        for entry in entries {
            registry.register(ProviderDescriptor::from_entry(entry, chains));
        }
        registry
    }

    /// Register a provider. A later registration with the same id replaces the earlier one.
    pub fn register(&mut self, descriptor: ProviderDescriptor) {
        let id = descriptor.id.clone();
        if self.providers.insert(id.clone(), Arc::new(descriptor)).is_some() {
            log::info!("[registry] Replaced wallet provider '{}'", id);
        } else {
            log::debug!("[registry] Registered wallet provider '{}'", id);
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<ProviderDescriptor>> {
        self.providers.get(id).cloned()
    }

    pub fn list_all(&self) -> Vec<Arc<ProviderDescriptor>> {
        self.providers.values().cloned().collect()
    }

    pub fn list_by_category(&self, category: ProviderCategory) -> Vec<Arc<ProviderDescriptor>> {
        self.providers
            .values()
            .filter(|p| p.category == category)
            .cloned()
            .collect()
    }

    /// Providers whose installation check passes right now
    pub fn list_installed(&self) -> Vec<Arc<ProviderDescriptor>> {
        self.providers
            .values()
            .filter(|p| p.is_installed(self.probe.as_ref()))
            .cloned()
            .collect()
    }

    pub fn is_installed(&self, descriptor: &ProviderDescriptor) -> bool {
        descriptor.is_installed(self.probe.as_ref())
    }

    pub fn has_provider(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockConnector, MockProvider};
    use parking_lot::Mutex;
    use std::collections::HashSet;

    fn descriptor(id: &str, name: &str, category: ProviderCategory) -> ProviderDescriptor {
        let provider = MockProvider::new("0xabc0000000000000000000000000000000000001", 137);
        ProviderDescriptor::new(id, name, category, MockConnector::new(provider))
    }

    /// Probe whose availability can be flipped between calls
    struct ToggleProbe(Mutex<HashSet<String>>);

    impl EnvironmentProbe for ToggleProbe {
        fn is_available(&self, key: &str) -> bool {
            self.0.lock().contains(key)
        }
    }

    #[test]
    fn test_ids_stay_unique_and_last_registration_wins() {
        let mut registry = ProviderRegistry::new(Arc::new(StaticProbe::default()));
        registry.register(descriptor("demo", "First", ProviderCategory::Browser));
        registry.register(descriptor("other", "Other", ProviderCategory::Mobile));
        registry.register(descriptor("demo", "Second", ProviderCategory::Hardware));

        let all = registry.list_all();
        assert_eq!(all.len(), 2);
        let ids: HashSet<&str> = all.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids.len(), all.len());

        let demo = registry.get("demo").unwrap();
        assert_eq!(demo.display_name, "Second");
        assert_eq!(demo.category, ProviderCategory::Hardware);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_list_by_category() {
        let mut registry = ProviderRegistry::new(Arc::new(StaticProbe::default()));
        registry.register(descriptor("a", "A", ProviderCategory::Browser));
        registry.register(descriptor("b", "B", ProviderCategory::Hardware));
        registry.register(descriptor("c", "C", ProviderCategory::Browser));

        let mut browser: Vec<String> = registry
            .list_by_category(ProviderCategory::Browser)
            .iter()
            .map(|p| p.id.clone())
            .collect();
        browser.sort();
        assert_eq!(browser, vec!["a", "c"]);
        assert!(registry.list_by_category(ProviderCategory::Social).is_empty());
    }

    #[test]
    fn test_installed_list_is_evaluated_per_call() {
        let probe = Arc::new(ToggleProbe(Mutex::new(HashSet::new())));
        let mut registry = ProviderRegistry::new(probe.clone());
        registry.register(
            descriptor("ext", "Extension", ProviderCategory::Browser)
                .with_installation_check(InstallationCheck::requires(vec!["EXT_HANDLER".into()]))
                .with_download_url("https://example.org/ext"),
        );
        registry.register(descriptor("always", "Always", ProviderCategory::Social));

        let installed: Vec<String> = registry.list_installed().iter().map(|p| p.id.clone()).collect();
        assert_eq!(installed, vec!["always"]);

        // User installs the extension mid-session
        probe.0.lock().insert("EXT_HANDLER".into());
        assert_eq!(registry.list_installed().len(), 2);
    }

    #[test]
    fn test_category_strings() {
        assert_eq!(ProviderCategory::Institutional.to_string(), "institutional");
        assert_eq!("mobile".parse::<ProviderCategory>().unwrap(), ProviderCategory::Mobile);
    }
}
