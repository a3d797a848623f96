//! Drives collector and dispatcher for every applicable provider.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::collector::{CollectReport, Collector};
use crate::config::{Config, ProviderSettings};
use crate::dispatcher::{
    DispatchReport, Dispatcher, HttpConfig, PushClient, PushError, Schedule, StopReason,
};
use crate::gdpr::{GdprError, Obfuscator};
use crate::hooks::{HookContext, HookError, Hooks, Stage};
use crate::host::HostIdentity;
use crate::observability::{Metrics, MetricsSnapshot};
use crate::providers::{Provider, ProviderRegistry, RegistryError};
use crate::queue::{QueueError, QueueStore};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("provider selection failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("push client setup failed: {0}")]
    Push(#[from] PushError),

    #[error("GDPR setup failed: {0}")]
    Gdpr(#[from] GdprError),

    #[error(transparent)]
    Hook(#[from] HookError),
}

pub type Result<T> = std::result::Result<T, RunError>;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProviderOutcome {
    Completed {
        collect: CollectReport,
        /// One report per dispatcher pass; a parallel run may need a drain pass
        dispatch: Vec<DispatchReport>,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderRun {
    pub provider: String,
    pub batch_size: usize,
    pub interval_secs: f64,
    pub parallel: bool,
    pub outcome: ProviderOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub providers: Vec<ProviderRun>,
    /// Registered providers that probed as not applicable
    pub not_applicable: Vec<String>,
    #[serde(skip)]
    pub metrics: MetricsSnapshot,
}

impl RunReport {
    pub fn failed(&self) -> usize {
        self.providers
            .iter()
            .filter(|p| matches!(p.outcome, ProviderOutcome::Failed { .. }))
            .count()
    }
}

pub struct Runner {
    config: Arc<Config>,
    registry: ProviderRegistry,
    host: Arc<HostIdentity>,
    hooks: Hooks,
    metrics: Arc<Metrics>,
}

impl Runner {
    pub fn new(config: Arc<Config>, registry: ProviderRegistry, host: Arc<HostIdentity>) -> Self {
        Self {
            config,
            registry,
            host,
            hooks: Hooks::new(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    pub async fn run(&self) -> Result<RunReport> {
        let store = QueueStore::open(&self.config.queue.path);
        self.hooks.run(&HookContext {
            stage: Stage::Init,
            provider: None,
            queue: &store,
        })?;

        store.ensure_dir()?;
        if self.config.queue.cleanup {
            store.clear()?;
        }

        let mut registry = self.registry.clone();
        registry.retain_named(&self.config.runner.providers)?;

        let client = Arc::new(self.push_client()?);
        let obfuscator = self.obfuscator()?;

        let mut report = RunReport {
            providers: Vec::new(),
            not_applicable: Vec::new(),
            metrics: MetricsSnapshot::default(),
        };

        for provider in registry.iter() {
            match provider.probe().await {
                Ok(Some(description)) => {
                    info!(provider = provider.name(), %description, "Provider applicable");
                }
                Ok(None) => {
                    info!(provider = provider.name(), "Provider not applicable");
                    report.not_applicable.push(provider.name().to_string());
                    continue;
                }
                Err(e) => {
                    info!(provider = provider.name(), error = %e, "Provider not applicable");
                    report.not_applicable.push(provider.name().to_string());
                    continue;
                }
            }

            let settings = ProviderSettings::resolve(&self.config, provider.defaults());
            let outcome = self
                .run_provider(provider.clone(), &store, client.clone(), obfuscator.clone(), settings)
                .await;

            if let ProviderOutcome::Failed { error } = &outcome {
                error!(provider = provider.name(), %error, "Provider run failed");
            }

            report.providers.push(ProviderRun {
                provider: provider.name().to_string(),
                batch_size: settings.batch_size,
                interval_secs: settings.interval.as_secs_f64(),
                parallel: settings.parallel,
                outcome,
            });
        }

        if report.providers.is_empty() {
            warn!("No applicable provider found");
        }

        self.hooks.run(&HookContext {
            stage: Stage::Finalize,
            provider: None,
            queue: &store,
        })?;

        report.metrics = self.metrics.snapshot();
        info!(
            providers = report.providers.len(),
            failed = report.failed(),
            collected = report.metrics.domains_collected,
            pushed = report.metrics.records_pushed,
            "Run finished"
        );

        Ok(report)
    }

    async fn run_provider(
        &self,
        provider: Arc<dyn Provider>,
        store: &QueueStore,
        client: Arc<PushClient>,
        obfuscator: Option<Obfuscator>,
        settings: ProviderSettings,
    ) -> ProviderOutcome {
        let name = provider.name().to_string();
        info!(
            provider = %name,
            batch_size = settings.batch_size,
            interval = ?settings.interval,
            parallel = settings.parallel,
            "Starting provider"
        );

        let collector = Collector::builder()
            .provider(provider)
            .store(store.clone())
            .host(self.host.clone())
            .backoff(self.config.collect_backoff())
            .maybe_obfuscator(obfuscator)
            .progress_every(self.config.collect.progress_every)
            .metrics(self.metrics.clone())
            .build();

        let schedule = Schedule::for_host(
            settings.interval,
            self.config.push.interval_offset.map(|d| d.as_duration()),
            &self.host,
        );
        let dispatcher = Dispatcher::builder()
            .store(store.clone())
            .client(client)
            .schedule(schedule)
            .batch_size(settings.batch_size)
            .metrics(self.metrics.clone())
            .build();

        let pre_push = HookContext {
            stage: Stage::PrePush,
            provider: Some(name.as_str()),
            queue: store,
        };

        if settings.parallel {
            if let Err(e) = self.hooks.run(&pre_push) {
                return failed(e);
            }
            run_parallel(collector, dispatcher).await
        } else {
            let collect = match collector.run().await {
                Ok(report) => report,
                Err(e) => return failed(e),
            };
            if let Err(e) = self.hooks.run(&pre_push) {
                return failed(e);
            }
            match dispatcher.run().await {
                Ok(dispatch) => ProviderOutcome::Completed {
                    collect,
                    dispatch: vec![dispatch],
                },
                Err(e) => failed(e),
            }
        }
    }

    fn push_client(&self) -> Result<PushClient> {
        let push = &self.config.push;
        let http = HttpConfig {
            request_timeout: push.timeout.as_duration(),
            token: push.token.clone(),
            ..Default::default()
        };
        Ok(PushClient::new(&push.url, http, self.config.push_backoff())?)
    }

    fn obfuscator(&self) -> Result<Option<Obfuscator>> {
        let gdpr = &self.config.gdpr;
        if !gdpr.enabled {
            return Ok(None);
        }
        let psk = gdpr.psk.as_deref().unwrap_or_default();
        Ok(Some(Obfuscator::new(psk, &gdpr.fields)?))
    }
}

/// Collector and dispatcher as concurrent tasks, both joined before returning
async fn run_parallel(collector: Collector, dispatcher: Dispatcher) -> ProviderOutcome {
    let dispatcher = Arc::new(dispatcher);

    let collect_task = tokio::spawn(async move { collector.run().await });
    let dispatch_task = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.run().await })
    };

    let (collected, dispatched) = tokio::join!(collect_task, dispatch_task);

    let collect = match collected {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => return failed(e),
        Err(e) => return failed(format!("collector task aborted: {e}")),
    };
    let first = match dispatched {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => return failed(e),
        Err(e) => return failed(format!("dispatcher task aborted: {e}")),
    };

    let mut dispatch = vec![first];

    // The dispatcher may have stopped before the collector finished writing
    if first.stop != StopReason::DeliveryFailed {
        match dispatcher.pending() {
            Ok(count) if count > 0 => {
                info!(pending = count, "Records left after collection finished, draining queue");
                match dispatcher.run().await {
                    Ok(report) => dispatch.push(report),
                    Err(e) => return failed(e),
                }
            }
            Ok(_) => {}
            Err(e) => return failed(e),
        }
    }

    ProviderOutcome::Completed { collect, dispatch }
}

fn failed(error: impl ToString) -> ProviderOutcome {
    ProviderOutcome::Failed {
        error: error.to_string(),
    }
}
