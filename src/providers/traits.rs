use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::queue::DomainRecord;

/// Provider errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("command `{command}` failed: {reason}")]
    Command { command: String, reason: String },
    #[error("domain lookup failed for {domain}: {reason}")]
    Lookup { domain: String, reason: String },
}

/// Scheduling preferences a provider may declare
///
/// `None` falls back to configuration, then to global defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderDefaults {
    pub batch_size: Option<usize>,
    pub push_interval: Option<Duration>,
    pub parallel: Option<bool>,
}

/// A source of per-domain hosting data for one platform type
///
/// The runner probes every registered provider and only drives those that
/// report themselves applicable to the current host.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short identifier, used in `meta.type` and in configuration
    fn name(&self) -> &str;

    /// `Ok(Some(description))` when this provider applies to the host.
    /// `Ok(None)` or an error both mean "not applicable".
    async fn probe(&self) -> Result<Option<String>, ProviderError>;

    /// Complete list of domains hosted here
    async fn list_domains(&self) -> Result<Vec<String>, ProviderError>;

    /// Detailed facts for one domain
    async fn domain_info(&self, domain: &str) -> Result<DomainRecord, ProviderError>;

    fn defaults(&self) -> ProviderDefaults {
        ProviderDefaults::default()
    }
}
