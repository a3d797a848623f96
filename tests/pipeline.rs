use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sitekick::config::{Config, HumanDuration};
use sitekick::dispatcher::StopReason;
use sitekick::hooks::{Hooks, Stage};
use sitekick::host::HostIdentity;
use sitekick::providers::{Provider, ProviderDefaults, ProviderError, ProviderRegistry};
use sitekick::queue::{DomainRecord, QueueStore};
use sitekick::runner::{ProviderOutcome, RunError, Runner};

/// In-memory provider for driving the runner
struct StaticProvider {
    name: &'static str,
    applicable: bool,
    domains: Option<Vec<String>>,
    defaults: ProviderDefaults,
}

impl StaticProvider {
    fn new(name: &'static str, domains: &[&str]) -> Self {
        Self {
            name,
            applicable: true,
            domains: Some(domains.iter().map(|d| d.to_string()).collect()),
            defaults: ProviderDefaults::default(),
        }
    }

    fn not_applicable(mut self) -> Self {
        self.applicable = false;
        self
    }

    fn broken_listing(mut self) -> Self {
        self.domains = None;
        self
    }
}

#[async_trait]
impl Provider for StaticProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn probe(&self) -> Result<Option<String>, ProviderError> {
        Ok(self.applicable.then(|| format!("{} 1.0", self.name)))
    }

    async fn list_domains(&self) -> Result<Vec<String>, ProviderError> {
        self.domains
            .clone()
            .ok_or_else(|| ProviderError::Command {
                command: "list".to_string(),
                reason: "listing unavailable".to_string(),
            })
    }

    async fn domain_info(&self, domain: &str) -> Result<DomainRecord, ProviderError> {
        let mut record = DomainRecord::new();
        record.insert("domain".to_string(), json!(domain));
        record.insert("email".to_string(), json!(format!("admin@{domain}")));
        Ok(record)
    }

    fn defaults(&self) -> ProviderDefaults {
        self.defaults
    }
}

fn test_config(queue: &TempDir, url: String) -> Config {
    let mut config = Config::default();
    config.queue.path = queue.path().join("queue");
    config.push.url = url;
    config.push.batch_size = Some(2);
    config.push.interval = Some(HumanDuration::from_millis(20));
    config.push.attempts = 2;
    config.push.first_retry = HumanDuration::from_millis(1);
    config.push.last_retry = HumanDuration::from_millis(2);
    config.collect.attempts = 1;
    config.collect.first_retry = HumanDuration::from_millis(1);
    config.collect.last_retry = HumanDuration::from_millis(1);
    config
}

fn registry(providers: Vec<StaticProvider>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for provider in providers {
        registry.register(Arc::new(provider)).unwrap();
    }
    registry
}

fn host() -> Arc<HostIdentity> {
    Arc::new(HostIdentity::new("web01", "10.0.0.5", Some("AA:BB:CC:DD:EE:FF".to_string())))
}

async fn accepting_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/queues/plesk"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

async fn pushed_records(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .flat_map(|request| {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            body["data"].as_array().unwrap().clone()
        })
        .collect()
}

fn sent(outcome: &ProviderOutcome) -> usize {
    match outcome {
        ProviderOutcome::Completed { dispatch, .. } => dispatch.iter().map(|d| d.sent).sum(),
        ProviderOutcome::Failed { error } => panic!("provider failed: {error}"),
    }
}

#[tokio::test]
async fn test_parallel_run_delivers_everything() {
    let server = accepting_server().await;
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir, format!("{}/queues/plesk", server.uri()));
    let queue = QueueStore::open(&config.queue.path);

    let domains = ["a.com", "b.com", "c.com", "d.com", "e.com"];
    let runner = Runner::new(
        Arc::new(config),
        registry(vec![StaticProvider::new("static", &domains)]),
        host(),
    );

    let report = runner.run().await.unwrap();

    assert_eq!(report.providers.len(), 1);
    let run = &report.providers[0];
    assert!(run.parallel);
    assert_eq!(run.batch_size, 2);
    assert_eq!(sent(&run.outcome), 5);
    assert_eq!(queue.pending_count().unwrap(), 0);

    let mut delivered: Vec<String> = pushed_records(&server)
        .await
        .iter()
        .map(|r| r["domain"].as_str().unwrap().to_string())
        .collect();
    delivered.sort();
    assert_eq!(delivered, domains);

    assert_eq!(report.metrics.domains_collected, 5);
    assert_eq!(report.metrics.records_pushed, 5);
}

#[tokio::test]
async fn test_sequential_run_keeps_arrival_order() {
    let server = accepting_server().await;
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir, format!("{}/queues/plesk", server.uri()));
    config.runner.parallel = Some(false);

    let runner = Runner::new(
        Arc::new(config),
        registry(vec![StaticProvider::new("static", &["c.com", "a.com", "b.com"])]),
        host(),
    );

    let report = runner.run().await.unwrap();

    match &report.providers[0].outcome {
        ProviderOutcome::Completed { collect, dispatch } => {
            assert_eq!(collect.queued, 3);
            assert_eq!(dispatch.len(), 1);
            assert_eq!(dispatch[0].batches, 2);
            assert_eq!(dispatch[0].stop, StopReason::Empty);
        }
        ProviderOutcome::Failed { error } => panic!("provider failed: {error}"),
    }

    let records = pushed_records(&server).await;
    let order: Vec<_> = records.iter().map(|r| r["domain"].clone()).collect();
    assert_eq!(order, vec![json!("c.com"), json!("a.com"), json!("b.com")]);

    let meta = &records[0]["meta"];
    assert_eq!(meta["type"], "static");
    assert_eq!(meta["hostname"], "web01");
    assert_eq!(meta["ip"], "10.0.0.5");
    assert_eq!(meta["mac"], "AA:BB:CC:DD:EE:FF");
}

#[tokio::test]
async fn test_provider_failures_are_isolated() {
    let server = accepting_server().await;
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir, format!("{}/queues/plesk", server.uri()));
    config.runner.parallel = Some(false);

    let runner = Runner::new(
        Arc::new(config),
        registry(vec![
            StaticProvider::new("absent", &["x.com"]).not_applicable(),
            StaticProvider::new("broken", &[]).broken_listing(),
            StaticProvider::new("healthy", &["ok.com"]),
        ]),
        host(),
    );

    let report = runner.run().await.unwrap();

    assert_eq!(report.not_applicable, vec!["absent"]);
    assert_eq!(report.providers.len(), 2);
    assert_eq!(report.failed(), 1);
    assert!(matches!(
        report.providers[0].outcome,
        ProviderOutcome::Failed { .. }
    ));
    assert_eq!(sent(&report.providers[1].outcome), 1);
}

#[tokio::test]
async fn test_failed_delivery_keeps_queue() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir, server.uri());
    config.runner.parallel = Some(false);
    let queue = QueueStore::open(&config.queue.path);

    let runner = Runner::new(
        Arc::new(config),
        registry(vec![StaticProvider::new("static", &["a.com", "b.com", "c.com"])]),
        host(),
    );

    let report = runner.run().await.unwrap();

    match &report.providers[0].outcome {
        ProviderOutcome::Completed { dispatch, .. } => {
            assert_eq!(dispatch[0].stop, StopReason::DeliveryFailed);
            assert_eq!(dispatch[0].sent, 0);
        }
        ProviderOutcome::Failed { error } => panic!("provider failed: {error}"),
    }
    assert_eq!(queue.pending_count().unwrap(), 3);
    assert_eq!(report.metrics.push_failures, 1);
}

#[tokio::test]
async fn test_hooks_run_at_each_stage() {
    let server = accepting_server().await;
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir, format!("{}/queues/plesk", server.uri()));
    config.runner.parallel = Some(false);

    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut hooks = Hooks::new();
    for stage in [Stage::Init, Stage::PrePush, Stage::Finalize] {
        let calls = calls.clone();
        hooks.register(stage, "record", move |ctx| {
            let pending = ctx.queue.pending_count()?;
            calls
                .lock()
                .unwrap()
                .push((ctx.stage, ctx.provider.map(str::to_string), pending));
            Ok(())
        });
    }

    let runner = Runner::new(
        Arc::new(config),
        registry(vec![StaticProvider::new("static", &["a.com", "b.com"])]),
        host(),
    )
    .with_hooks(hooks);

    runner.run().await.unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(
        *calls,
        vec![
            (Stage::Init, None, 0),
            (Stage::PrePush, Some("static".to_string()), 2),
            (Stage::Finalize, None, 0),
        ]
    );
}

#[tokio::test]
async fn test_init_hook_failure_aborts_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir, server.uri());

    let mut hooks = Hooks::new();
    hooks.register(Stage::Init, "maintenance-window", |_| {
        Err("maintenance in progress".into())
    });

    let runner = Runner::new(
        Arc::new(config),
        registry(vec![StaticProvider::new("static", &["a.com"])]),
        host(),
    )
    .with_hooks(hooks);

    assert!(matches!(runner.run().await, Err(RunError::Hook(_))));
}

#[tokio::test]
async fn test_cleanup_discards_stale_records() {
    let server = accepting_server().await;
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir, format!("{}/queues/plesk", server.uri()));
    config.queue.cleanup = true;
    config.runner.parallel = Some(false);

    let queue = QueueStore::open(&config.queue.path);
    queue.enqueue(7, "stale.com", &DomainRecord::new()).unwrap();

    let runner = Runner::new(
        Arc::new(config),
        registry(vec![StaticProvider::new("static", &["fresh.com"])]),
        host(),
    );
    runner.run().await.unwrap();

    let delivered: Vec<_> = pushed_records(&server)
        .await
        .iter()
        .map(|r| r["domain"].clone())
        .collect();
    assert_eq!(delivered, vec![json!("fresh.com")]);
}

#[tokio::test]
async fn test_unknown_provider_filter_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir, "http://127.0.0.1:9/queues/plesk".to_string());
    config.runner.providers = vec!["cpanel".to_string()];

    let runner = Runner::new(
        Arc::new(config),
        registry(vec![StaticProvider::new("static", &["a.com"])]),
        host(),
    );

    assert!(matches!(runner.run().await, Err(RunError::Registry(_))));
}

#[tokio::test]
async fn test_gdpr_obfuscates_before_delivery() {
    let server = accepting_server().await;
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir, format!("{}/queues/plesk", server.uri()));
    config.runner.parallel = Some(false);
    config.gdpr.enabled = true;
    config.gdpr.psk = Some("fleet-secret".to_string());
    config.gdpr.fields = vec!["email".to_string()];

    let runner = Runner::new(
        Arc::new(config),
        registry(vec![StaticProvider::new("static", &["a.com"])]),
        host(),
    );
    runner.run().await.unwrap();

    let records = pushed_records(&server).await;
    assert_eq!(records.len(), 1);
    let email = records[0]["email"].as_str().unwrap();
    assert!(email.starts_with("hmac-sha256:"));
    assert_ne!(email, "admin@a.com");
    assert_eq!(records[0]["meta"]["domain"], "a.com");
}

#[tokio::test]
async fn test_provider_defaults_apply_without_overrides() {
    let server = accepting_server().await;
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir, format!("{}/queues/plesk", server.uri()));
    config.push.batch_size = None;

    let mut provider = StaticProvider::new("static", &["a.com", "b.com", "c.com"]);
    provider.defaults = ProviderDefaults {
        batch_size: Some(10),
        push_interval: Some(Duration::from_secs(100)),
        parallel: Some(false),
    };

    let runner = Runner::new(Arc::new(config), registry(vec![provider]), host());
    let report = runner.run().await.unwrap();

    let run = &report.providers[0];
    assert_eq!(run.batch_size, 10);
    assert!(!run.parallel);
    // interval comes from config, which beats the provider's 100s
    assert!((run.interval_secs - 0.02).abs() < 1e-9);
    assert_eq!(sent(&run.outcome), 3);
}

#[tokio::test]
async fn test_restart_delivers_leftovers_first() {
    let server = accepting_server().await;
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir, format!("{}/queues/plesk", server.uri()));
    config.runner.parallel = Some(false);
    config.push.batch_size = Some(10);

    // Records a previous run queued but never delivered
    let queue = QueueStore::open(&config.queue.path);
    for (seq, domain) in [(0, "old-a.com"), (1, "old-b.com")] {
        let mut record = DomainRecord::new();
        record.insert("domain".to_string(), json!(domain));
        queue.enqueue(seq, domain, &record).unwrap();
    }

    let runner = Runner::new(
        Arc::new(config),
        registry(vec![StaticProvider::new("static", &["new.com"])]),
        host(),
    );
    runner.run().await.unwrap();

    let order: Vec<_> = pushed_records(&server)
        .await
        .iter()
        .map(|r| r["domain"].clone())
        .collect();
    assert_eq!(order, vec![json!("old-a.com"), json!("old-b.com"), json!("new.com")]);
    assert_eq!(queue.pending_count().unwrap(), 0);
}
