use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::plesk::PleskProvider;
use super::server::ServerProvider;
use super::traits::Provider;
use crate::host::HostIdentity;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("provider not found: {0}")]
    NotFound(String),
    #[error("provider registered twice: {0}")]
    Duplicate(String),
}

/// Registered providers, in registration order
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) -> Result<(), RegistryError> {
        if self.contains(provider.name()) {
            return Err(RegistryError::Duplicate(provider.name().to_string()));
        }
        debug!(provider = provider.name(), "Provider registered");
        self.providers.push(provider);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>, RegistryError> {
        self.providers
            .iter()
            .find(|p| p.name() == name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.iter().any(|p| p.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Keep only the named providers, preserving registration order.
    /// An empty list keeps everything.
    pub fn retain_named<S: AsRef<str>>(&mut self, names: &[S]) -> Result<(), RegistryError> {
        if names.is_empty() {
            return Ok(());
        }
        for name in names {
            if !self.contains(name.as_ref()) {
                return Err(RegistryError::NotFound(name.as_ref().to_string()));
            }
        }
        self.providers
            .retain(|p| names.iter().any(|n| n.as_ref() == p.name()));
        Ok(())
    }

    /// Registry with the built-in providers: `plesk`, then `server`
    pub fn with_defaults(host: Arc<HostIdentity>, system_info: bool) -> Self {
        let providers: Vec<Arc<dyn Provider>> = vec![
            Arc::new(PleskProvider::new(host.clone())),
            Arc::new(ServerProvider::new(host, system_info)),
        ];

        let registry = Self { providers };
        info!(providers = ?registry.names(), "Built-in providers registered");
        registry
    }
}
