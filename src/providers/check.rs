//! Provider diagnostics: probe, enumerate and sample a provider without
//! queueing or sending anything.

use rand::seq::IndexedRandom;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use super::registry::{ProviderRegistry, RegistryError};
use super::traits::Provider;
use crate::queue::DomainRecord;

const SAMPLE_SIZE: usize = 5;

/// Which providers to check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The most recently registered provider
    Latest,
    All,
    Named(Vec<String>),
}

impl Selection {
    /// `latest` (or nothing), `all`, or a comma-separated list of names
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") | Some("latest") => Selection::Latest,
            Some("all") => Selection::All,
            Some(list) => Selection::Named(
                list.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
        }
    }

    fn resolve(&self, registry: &ProviderRegistry) -> Result<Vec<Arc<dyn Provider>>, RegistryError> {
        match self {
            Selection::Latest => Ok(registry.iter().last().cloned().into_iter().collect()),
            Selection::All => Ok(registry.iter().cloned().collect()),
            Selection::Named(names) => names.iter().map(|n| registry.get(n)).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleResult {
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<DomainRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderCheck {
    pub provider: String,
    pub applicable: bool,
    pub probe: Option<String>,
    pub domain_count: usize,
    pub duplicates: usize,
    pub list_error: Option<String>,
    pub samples: Vec<SampleResult>,
}

/// Run diagnostics for the selected providers
pub async fn check(
    registry: &ProviderRegistry,
    selection: &Selection,
) -> Result<Vec<ProviderCheck>, RegistryError> {
    let mut reports = Vec::new();
    for provider in selection.resolve(registry)? {
        reports.push(check_provider(provider.as_ref()).await);
    }
    Ok(reports)
}

async fn check_provider(provider: &dyn Provider) -> ProviderCheck {
    let name = provider.name().to_string();
    info!(provider = %name, "Checking provider");

    let (applicable, probe) = match provider.probe().await {
        Ok(Some(description)) => (true, Some(description)),
        Ok(None) => (false, None),
        Err(e) => {
            warn!(provider = %name, error = %e, "Probe failed; provider not applicable here");
            (false, Some(e.to_string()))
        }
    };

    let (domains, list_error) = match provider.list_domains().await {
        Ok(domains) => (domains, None),
        Err(e) => {
            warn!(provider = %name, error = %e, "Listing domains failed");
            (Vec::new(), Some(e.to_string()))
        }
    };

    let unique: BTreeSet<&String> = domains.iter().collect();
    let duplicates = domains.len() - unique.len();
    if duplicates > 0 {
        warn!(provider = %name, duplicates, "Duplicate domains reported");
    }

    let mut sample: Vec<String> = {
        let unique: Vec<&String> = unique.into_iter().collect();
        unique
            .choose_multiple(&mut rand::rng(), SAMPLE_SIZE)
            .map(|d| (*d).clone())
            .collect()
    };
    sample.sort();
    if sample.is_empty() {
        // Exercise domain_info even when nothing is listed
        sample.push(String::new());
    }

    let mut samples = Vec::with_capacity(sample.len());
    for domain in sample {
        let result = match provider.domain_info(&domain).await {
            Ok(info) => SampleResult {
                domain,
                info: Some(info),
                error: None,
            },
            Err(e) => SampleResult {
                domain,
                info: None,
                error: Some(e.to_string()),
            },
        };
        samples.push(result);
    }

    info!(provider = %name, applicable, domains = domains.len(), "Provider check complete");

    ProviderCheck {
        provider: name,
        applicable,
        probe,
        domain_count: domains.len(),
        duplicates,
        list_error,
        samples,
    }
}
