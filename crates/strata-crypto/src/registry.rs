//! Binds named plugins to the suites they can service, and preloads cipher
//! suites that get merged into a loaded [`CryptoConfig`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::CryptoConfig;
use crate::error::{CryptoError, Result};
use crate::plugin::CryptPlugin;
use crate::suite::CipherSuite;

#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn CryptPlugin>>,
    preloaded_suites: Vec<CipherSuite>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn CryptPlugin>) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    pub fn plugin(&self, name: &str) -> Result<&Arc<dyn CryptPlugin>> {
        self.plugins.get(name).ok_or_else(|| CryptoError::PluginNotFound(name.to_string()))
    }

    /// Finds a registered plugin that supports `suite_name`, preferring the
    /// first one registered.
    pub fn plugin_for_suite(&self, suite_name: &str) -> Result<&Arc<dyn CryptPlugin>> {
        self.plugins.values().find(|p| p.supports(suite_name)).ok_or_else(|| CryptoError::UnsupportedSuite(suite_name.to_string()))
    }

    /// Preloads a cipher suite so it's available even if no loaded config
    /// declares it explicitly.
    pub fn preload_suite(&mut self, suite: CipherSuite) {
        self.preloaded_suites.push(suite);
    }

    /// Merges preloaded suites into `config` (a config-declared suite of
    /// the same name wins over a preloaded one) and re-validates the
    /// result before returning it.
    pub fn load_and_merge(&self, mut config: CryptoConfig) -> Result<CryptoConfig> {
        for suite in &self.preloaded_suites {
            if !config.suites.iter().any(|s| s.name == suite.name) {
                config.suites.push(suite.clone());
            }
        }
        tracing::info!(suites = config.suites.len(), preferred = ?config.preferred_suite, "crypto configuration after preload merge");
        config.validate()?;
        Ok(config)
    }
}
