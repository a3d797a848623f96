//! Vitals of the server itself, reported as a single pseudo-domain (its ip)

use async_trait::async_trait;
use chrono::Local;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;
use tracing::debug;

use super::shell;
use super::traits::{Provider, ProviderDefaults, ProviderError};
use crate::host::HostIdentity;
use crate::queue::DomainRecord;

pub const NAME: &str = "server";

const SYSTEM_COMMANDS: [&str; 4] = ["uptime", "free", "df", "lscpu"];

#[derive(Debug, Clone)]
pub struct ServerProvider {
    host: Arc<HostIdentity>,
    system_info: bool,
}

impl ServerProvider {
    /// `system_info` enables command output and OS facts in the record
    pub fn new(host: Arc<HostIdentity>, system_info: bool) -> Self {
        Self { host, system_info }
    }
}

#[async_trait]
impl Provider for ServerProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn probe(&self) -> Result<Option<String>, ProviderError> {
        if cfg!(target_os = "linux") {
            Ok(Some("linux".to_string()))
        } else {
            Ok(None)
        }
    }

    async fn list_domains(&self) -> Result<Vec<String>, ProviderError> {
        Ok(vec![self.host.ip.clone()])
    }

    async fn domain_info(&self, _domain: &str) -> Result<DomainRecord, ProviderError> {
        let mut record = DomainRecord::new();

        if self.system_info {
            for command in SYSTEM_COMMANDS {
                let value = match shell::run(command, &[]).await {
                    Ok(output) => json!(output.trim()),
                    Err(e) => {
                        debug!(command, error = %e, "System command unavailable");
                        Value::Null
                    }
                };
                record.insert(command.to_string(), value);
            }
            record.insert("system".to_string(), system_facts());
        }

        record.insert("ip".to_string(), json!(self.host.ip));
        record.insert("mac".to_string(), json!(self.host.mac));
        record.insert("hostname".to_string(), json!(self.host.hostname));
        record.insert(
            "now".to_string(),
            json!(Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        );

        Ok(record)
    }

    fn defaults(&self) -> ProviderDefaults {
        ProviderDefaults {
            batch_size: Some(10),
            push_interval: Some(Duration::from_secs(1)),
            parallel: Some(false),
        }
    }
}

fn system_facts() -> Value {
    let mut sys = System::new_all();
    sys.refresh_all();

    json!({
        "os_name": System::name(),
        "os_version": System::os_version(),
        "kernel_version": System::kernel_version(),
        "cpu_count": sys.cpus().len(),
        "memory_total": sys.total_memory(),
        "memory_available": sys.available_memory(),
        "uptime_secs": System::uptime(),
    })
}
