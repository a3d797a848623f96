//! Effective per-provider settings: configuration beats the provider's
//! preference, which beats the global default.

use super::models::{Config, DEFAULT_BATCH_SIZE, DEFAULT_PUSH_INTERVAL_SECS};
use crate::providers::ProviderDefaults;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderSettings {
    pub batch_size: usize,
    pub interval: Duration,
    pub parallel: bool,
}

impl ProviderSettings {
    pub fn resolve(config: &Config, defaults: ProviderDefaults) -> Self {
        let batch_size = config
            .push
            .batch_size
            .or(defaults.batch_size)
            .unwrap_or(DEFAULT_BATCH_SIZE)
            .max(1);

        let interval = config
            .push
            .interval
            .map(|d| d.as_duration())
            .or(defaults.push_interval)
            .filter(|d| !d.is_zero())
            .unwrap_or(Duration::from_secs(DEFAULT_PUSH_INTERVAL_SECS));

        let parallel = config.runner.parallel.or(defaults.parallel).unwrap_or(true);

        Self {
            batch_size,
            interval,
            parallel,
        }
    }
}
