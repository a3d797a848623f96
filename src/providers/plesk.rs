//! Plesk hosting panel, driven through the `plesk` command line
//!
//! Domains come from `plesk bin site --list`; per-domain facts from
//! `plesk bin domain --info`, whose sectioned text output is converted to
//! nested JSON. WordPress plugin data is added via `wp-toolkit` when the
//! domain id and web root can be read from that output.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::shell;
use super::traits::{Provider, ProviderDefaults, ProviderError};
use crate::host::HostIdentity;
use crate::queue::DomainRecord;

pub const NAME: &str = "plesk";

#[derive(Debug, Clone)]
pub struct PleskProvider {
    host: Arc<HostIdentity>,
    program: String,
}

impl PleskProvider {
    pub fn new(host: Arc<HostIdentity>) -> Self {
        Self::with_program(host, "plesk")
    }

    /// Provider driving a specific `plesk` executable
    pub fn with_program(host: Arc<HostIdentity>, program: impl Into<String>) -> Self {
        Self {
            host,
            program: program.into(),
        }
    }

    /// Plugin listing from wp-toolkit; `null` when the extension is missing or fails
    async fn wp_plugins(&self, domain: &str, domain_id: &str, path: &str) -> Value {
        let args = [
            "ext", "wp-toolkit", "--info", "-main-domain-id", domain_id, "-path", path, "-format",
            "raw",
        ];
        match shell::run(&self.program, &args).await {
            Ok(plugins) => json!(plugins),
            Err(e) => {
                warn!(domain = %domain, error = %e, "WordPress plugin info unavailable");
                Value::Null
            }
        }
    }
}

#[async_trait]
impl Provider for PleskProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn probe(&self) -> Result<Option<String>, ProviderError> {
        let output = shell::run(&self.program, &["version"]).await?;
        Ok(output
            .to_lowercase()
            .contains("version")
            .then(|| output.trim().to_string()))
    }

    async fn list_domains(&self) -> Result<Vec<String>, ProviderError> {
        let output = shell::run(&self.program, &["bin", "site", "--list"]).await?;
        Ok(parse_domain_list(&output))
    }

    async fn domain_info(&self, domain: &str) -> Result<DomainRecord, ProviderError> {
        let info = shell::run(&self.program, &["bin", "domain", "--info", domain]).await?;
        if info.trim().is_empty() {
            return Err(ProviderError::Lookup {
                domain: domain.to_string(),
                reason: "empty output from `plesk bin domain --info`".to_string(),
            });
        }

        let sections = parse_sections(&info);

        let mut record = DomainRecord::new();
        record.insert(
            "Server".to_string(),
            json!({
                "Hostname": self.host.hostname,
                "IP-address": self.host.ip,
                "MAC-address": self.host.mac,
            }),
        );
        record.insert("provider".to_string(), json!(NAME));
        record.insert("domain".to_string(), json!(domain));
        record.insert("info".to_string(), json!(info));

        if let Some((domain_id, path)) = wordpress_location(&sections, domain) {
            let plugins = shell::run(
                "plesk",
                &[
                    "ext", "wp-toolkit", "--info", "-main-domain-id", &domain_id, "-path", &path,
                    "-format", "raw",
                ],
            )
            .await?;
            record.insert("wp_plugins".to_string(), json!(plugins));
        }

        record.insert("sections".to_string(), Value::Object(sections));
        Ok(record)
    }

    fn defaults(&self) -> ProviderDefaults {
        ProviderDefaults {
            batch_size: Some(200),
            push_interval: Some(Duration::from_secs(100)),
            parallel: None,
        }
    }
}

/// One domain per non-empty line
pub fn parse_domain_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Convert `plesk bin domain --info` text into `{section: {key: value}}`
///
/// A line starting with `===` makes the previous line the current section
/// title; `key: value` lines (split on the first colon) fill that section.
pub fn parse_sections(text: &str) -> Map<String, Value> {
    let mut result = Map::new();
    let mut current: Option<String> = None;
    let mut previous = "";

    for line in text.lines().map(|l| l.trim_end_matches('\r')) {
        if line.starts_with("===") {
            let title = previous.trim().to_string();
            result.insert(title.clone(), Value::Object(Map::new()));
            current = Some(title);
        } else if let (Some(section), Some((key, value))) = (&current, line.split_once(':')) {
            if let Some(Value::Object(fields)) = result.get_mut(section) {
                fields.insert(key.trim().to_string(), json!(value.trim()));
            }
        }
        previous = line;
    }

    result
}

/// Domain id and site path relative to the domain's web root, when both are known
fn wordpress_location(sections: &Map<String, Value>, domain: &str) -> Option<(String, String)> {
    let domain_id = section_field(sections, "General", "Domain ID")?;
    let www_root = section_field(sections, "Logrotation info", "--WWW-Root--")?;
    let path = www_root
        .rsplit_once(domain)
        .map_or(www_root, |(_, rest)| rest);

    if path.is_empty() {
        return None;
    }

    Some((domain_id.to_string(), path.to_string()))
}

fn section_field<'a>(sections: &'a Map<String, Value>, section: &str, key: &str) -> Option<&'a str> {
    sections
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
}
