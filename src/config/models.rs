use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Batch size when neither configuration nor the provider declares one
pub const DEFAULT_BATCH_SIZE: usize = 20;
/// Push interval when neither configuration nor the provider declares one
pub const DEFAULT_PUSH_INTERVAL_SECS: u64 = 10;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub collect: CollectConfig,
    #[serde(default)]
    pub gdpr: GdprConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Queue directory settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_path")]
    pub path: PathBuf,
    /// Remove pending records before collecting
    #[serde(default)]
    pub cleanup: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: default_queue_path(),
            cleanup: false,
        }
    }
}

fn default_queue_path() -> PathBuf {
    PathBuf::from("data/queue")
}

/// Delivery to the collection endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PushConfig {
    #[serde(default = "default_push_url")]
    pub url: String,
    /// Bearer token (also read from `SITEKICK_TOKEN`)
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    /// Records per request; overrides the provider's preference
    pub batch_size: Option<usize>,
    /// Time between batches; overrides the provider's preference
    pub interval: Option<HumanDuration>,
    /// Fixed offset into each interval; derived from the host when unset
    pub interval_offset: Option<HumanDuration>,
    #[serde(default = "default_push_attempts")]
    pub attempts: u32,
    #[serde(default = "default_push_first_retry")]
    pub first_retry: HumanDuration,
    #[serde(default = "default_push_last_retry")]
    pub last_retry: HumanDuration,
    #[serde(default = "default_push_timeout")]
    pub timeout: HumanDuration,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: default_push_url(),
            token: None,
            batch_size: None,
            interval: None,
            interval_offset: None,
            attempts: default_push_attempts(),
            first_retry: default_push_first_retry(),
            last_retry: default_push_last_retry(),
            timeout: default_push_timeout(),
        }
    }
}

fn default_push_url() -> String {
    "https://sitekick.okapi.online/client/administration/queues/plesk".to_string()
}

fn default_push_attempts() -> u32 {
    10
}

fn default_push_first_retry() -> HumanDuration {
    HumanDuration::from_secs(1)
}

fn default_push_last_retry() -> HumanDuration {
    HumanDuration::from_secs(60)
}

fn default_push_timeout() -> HumanDuration {
    HumanDuration::from_secs(30)
}

/// Collection from providers
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectConfig {
    #[serde(default = "default_collect_attempts")]
    pub attempts: u32,
    #[serde(default = "default_collect_first_retry")]
    pub first_retry: HumanDuration,
    #[serde(default = "default_collect_last_retry")]
    pub last_retry: HumanDuration,
    /// Include command output and OS facts in the server record
    #[serde(default = "default_true")]
    pub system_info: bool,
    /// Emit a progress line every N records
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            attempts: default_collect_attempts(),
            first_retry: default_collect_first_retry(),
            last_retry: default_collect_last_retry(),
            system_info: true,
            progress_every: default_progress_every(),
        }
    }
}

fn default_collect_attempts() -> u32 {
    10
}

fn default_collect_first_retry() -> HumanDuration {
    HumanDuration::from_secs(1)
}

fn default_collect_last_retry() -> HumanDuration {
    HumanDuration::from_secs(5)
}

fn default_progress_every() -> usize {
    100
}

fn default_true() -> bool {
    true
}

/// Obfuscation of personal data before it is queued
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GdprConfig {
    #[serde(default)]
    pub enabled: bool,
    /// HMAC key (also read from `SITEKICK_GDPR_PSK`)
    #[serde(default, skip_serializing)]
    pub psk: Option<String>,
    /// Field names to obfuscate, matched case-insensitively at any depth
    #[serde(default = "default_gdpr_fields")]
    pub fields: Vec<String>,
}

impl Default for GdprConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            psk: None,
            fields: default_gdpr_fields(),
        }
    }
}

fn default_gdpr_fields() -> Vec<String> {
    ["Owner's contact name", "FTP Login", "email", "e-mail", "contact_email"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Provider orchestration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RunnerConfig {
    /// Run collector and dispatcher concurrently; overrides the provider's preference
    pub parallel: Option<bool>,
    /// Restrict discovery to these providers (empty = all registered)
    #[serde(default)]
    pub providers: Vec<String>,
}

/// Log output
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Values supplied on the command line, applied on top of every other source
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub queue_path: Option<PathBuf>,
    pub push_url: Option<String>,
    pub token: Option<String>,
    pub system_info: Option<bool>,
    pub gdpr_enabled: Option<bool>,
    pub gdpr_psk: Option<String>,
    pub batch_size: Option<usize>,
    pub interval: Option<HumanDuration>,
    pub parallel: Option<bool>,
    pub cleanup: Option<bool>,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.queue_path {
            config.queue.path = path.clone();
        }
        if let Some(url) = &self.push_url {
            config.push.url = url.clone();
        }
        if let Some(token) = &self.token {
            config.push.token = Some(token.clone());
        }
        if let Some(system_info) = self.system_info {
            config.collect.system_info = system_info;
        }
        if let Some(enabled) = self.gdpr_enabled {
            config.gdpr.enabled = enabled;
        }
        if let Some(psk) = &self.gdpr_psk {
            config.gdpr.psk = Some(psk.clone());
        }
        if let Some(batch_size) = self.batch_size {
            config.push.batch_size = Some(batch_size);
        }
        if let Some(interval) = self.interval {
            config.push.interval = Some(interval);
        }
        if let Some(parallel) = self.parallel {
            config.runner.parallel = Some(parallel);
        }
        if let Some(cleanup) = self.cleanup {
            config.queue.cleanup = cleanup;
        }
    }
}
