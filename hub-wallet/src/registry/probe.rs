//! Host environment probes used by installation checks
//!
//! A probe answers whether a named native handler is present. The registry
//! never looks at process globals directly; it asks the probe it was built with.

use std::collections::HashSet;

pub trait EnvironmentProbe: Send + Sync {
    fn is_available(&self, key: &str) -> bool;
}

/// Treats a non-empty environment variable as an installed handler
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvProbe;

impl EnvironmentProbe for ProcessEnvProbe {
    fn is_available(&self, key: &str) -> bool {
        std::env::var(key).map(|v| !v.trim().is_empty()).unwrap_or(false)
    }
}

/// Fixed set of available handlers
#[derive(Debug, Default, Clone)]
pub struct StaticProbe {
    available: HashSet<String>,
}

impl StaticProbe {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            available: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl EnvironmentProbe for StaticProbe {
    fn is_available(&self, key: &str) -> bool {
        self.available.contains(key)
    }
}
