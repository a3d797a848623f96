//! Tracing setup and run counters

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` wins over `level`.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests, embedded use) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Counters shared by the collector and dispatcher of one run
#[derive(Debug, Default)]
pub struct Metrics {
    domains_collected: AtomicU64,
    domains_skipped: AtomicU64,
    records_pushed: AtomicU64,
    batches_sent: AtomicU64,
    push_failures: AtomicU64,
    records_quarantined: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn domain_collected(&self) {
        self.domains_collected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn domain_skipped(&self) {
        self.domains_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "domains_skipped", "Metric incremented");
    }

    pub fn batch_sent(&self, records: usize) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.records_pushed
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn push_failed(&self) {
        self.push_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "push_failures", "Metric incremented");
    }

    pub fn record_quarantined(&self) {
        self.records_quarantined.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "records_quarantined", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            domains_collected: self.domains_collected.load(Ordering::Relaxed),
            domains_skipped: self.domains_skipped.load(Ordering::Relaxed),
            records_pushed: self.records_pushed.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            push_failures: self.push_failures.load(Ordering::Relaxed),
            records_quarantined: self.records_quarantined.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub domains_collected: u64,
    pub domains_skipped: u64,
    pub records_pushed: u64,
    pub batches_sent: u64,
    pub push_failures: u64,
    pub records_quarantined: u64,
}
