//! Turns a provider's domain list into queued records.
//!
//! Domains are normalized and de-duplicated, looked up with retry, stamped
//! with a `meta` block, optionally obfuscated, then written to the queue in
//! arrival order. A domain that keeps failing is skipped; only a failure to
//! enumerate domains at all aborts the run.

use bon::Builder;
use chrono::Local;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::gdpr::Obfuscator;
use crate::host::HostIdentity;
use crate::observability::Metrics;
use crate::providers::{Provider, ProviderError};
use crate::queue::{DomainRecord, QueueError, QueueStore};

/// Key under which delivery metadata is attached to each record
pub const META_KEY: &str = "meta";

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("provider {provider} failed to list domains: {source}")]
    Enumeration {
        provider: String,
        #[source]
        source: ProviderError,
    },

    #[error("queue unavailable: {0}")]
    Queue(#[from] QueueError),
}

pub type Result<T> = std::result::Result<T, CollectError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectReport {
    /// Names returned by the provider, before de-duplication
    pub listed: usize,
    pub queued: usize,
    pub duplicates: usize,
    /// Domains skipped after exhausting every lookup attempt
    pub failed: usize,
    /// Records collected but lost because the queue write failed
    pub write_errors: usize,
}

#[derive(Builder)]
pub struct Collector {
    provider: Arc<dyn Provider>,
    store: QueueStore,
    host: Arc<HostIdentity>,
    #[builder(default = Backoff::collect_default())]
    backoff: Backoff,
    obfuscator: Option<Obfuscator>,
    #[builder(default = 100)]
    progress_every: usize,
    #[builder(default)]
    metrics: Arc<Metrics>,
}

impl Collector {
    /// Collect every domain of the provider into the queue
    pub async fn run(&self) -> Result<CollectReport> {
        let provider = self.provider.name().to_string();

        let domains = self
            .provider
            .list_domains()
            .await
            .map_err(|source| CollectError::Enumeration {
                provider: provider.clone(),
                source,
            })?;

        let mut report = CollectReport {
            listed: domains.len(),
            ..Default::default()
        };
        info!(provider = %provider, domains = domains.len(), "Collecting domains");

        let mut sequence = self.store.next_sequence()?;
        let mut seen = HashSet::with_capacity(domains.len());
        let progress_every = self.progress_every.max(1);

        for raw in domains {
            let domain = normalize_domain(&raw);
            if domain.is_empty() {
                continue;
            }
            if seen.contains(&domain) {
                debug!(domain = %domain, "Duplicate domain skipped");
                report.duplicates += 1;
                continue;
            }

            let Some(mut record) = self.lookup(&domain).await else {
                report.failed += 1;
                self.metrics.domain_skipped();
                continue;
            };

            self.attach_meta(&mut record, &domain);
            if let Some(obfuscator) = &self.obfuscator {
                let replaced = obfuscator.apply(&mut record);
                debug!(domain = %domain, fields = replaced, "Record obfuscated");
            }

            match self.store.enqueue(sequence, &domain, &record) {
                Ok(_) => {
                    seen.insert(domain.clone());
                    report.queued += 1;
                    self.metrics.domain_collected();
                }
                Err(e) => {
                    error!(domain = %domain, error = %e, "Failed to queue record");
                    report.write_errors += 1;
                }
            }
            sequence += 1;

            let processed = report.queued + report.failed + report.write_errors;
            if processed % progress_every == 0 {
                info!(
                    provider = %provider,
                    processed,
                    total = report.listed,
                    "Collection progress"
                );
            }
        }

        info!(
            provider = %provider,
            listed = report.listed,
            queued = report.queued,
            duplicates = report.duplicates,
            failed = report.failed,
            write_errors = report.write_errors,
            "Collection finished"
        );

        Ok(report)
    }

    async fn lookup(&self, domain: &str) -> Option<DomainRecord> {
        let attempts = self.backoff.attempts();

        for attempt in 0..attempts {
            match self.provider.domain_info(domain).await {
                Ok(record) => return Some(record),
                Err(e) if attempt + 1 < attempts => {
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        domain = %domain,
                        attempt = attempt + 1,
                        attempts,
                        error = %e,
                        "Domain lookup failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        domain = %domain,
                        attempts,
                        error = %e,
                        "Domain lookup failed, skipping"
                    );
                }
            }
        }

        None
    }

    fn attach_meta(&self, record: &mut DomainRecord, domain: &str) {
        let meta = json!({
            "type": self.provider.name(),
            "domain": domain,
            "hostname": self.host.hostname,
            "ip": self.host.ip,
            "mac": self.host.mac,
            "timestamp": Local::now().to_rfc3339(),
        });
        record.insert(META_KEY.to_string(), meta);
    }
}

/// Trimmed, lower-cased domain name
pub fn normalize_domain(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// `meta` block of a queued record, if present
pub fn record_meta(record: &DomainRecord) -> Option<&serde_json::Map<String, Value>> {
    record.get(META_KEY).and_then(Value::as_object)
}
