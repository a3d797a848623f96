//! Batch delivery from the queue to the collection endpoint
//!
//! Each tick the dispatcher sleeps until its slot in the interval, takes the
//! oldest `batch_size` records and posts them in one request. Records are only
//! deleted after a 2xx answer, so delivery is at-least-once. The loop ends when
//! the queue is empty, when a tick selects exactly the records of the previous
//! tick (nothing was consumed, so repeating would not help), or when a batch
//! exhausts its retry budget.

mod http;
mod schedule;

pub use http::{HttpConfig, PushClient, PushError, encode_batch};
pub use schedule::{Schedule, host_offset};

use bon::Builder;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::observability::Metrics;
use crate::queue::{QueueError, QueueStore, QueuedItem};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("queue unavailable: {0}")]
    Queue(#[from] QueueError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// No pending records left
    Empty,
    /// Selection unchanged since the previous tick
    Stalled,
    /// A batch failed on every attempt; nothing was deleted
    DeliveryFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub batches: usize,
    pub sent: usize,
    pub quarantined: usize,
    pub stop: StopReason,
}

#[derive(Builder)]
pub struct Dispatcher {
    store: QueueStore,
    client: Arc<PushClient>,
    schedule: Schedule,
    #[builder(default = crate::config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    #[builder(default)]
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    /// Records currently waiting in the queue
    pub fn pending(&self) -> Result<usize> {
        Ok(self.store.pending_count()?)
    }

    pub async fn run(&self) -> Result<DispatchReport> {
        let mut previous: Vec<QueuedItem> = Vec::new();
        let mut batches = 0;
        let mut sent = 0;
        let mut quarantined = 0;

        let stop = loop {
            let delay = self.schedule.next_delay();
            debug!(delay = ?delay, "Waiting for next push slot");
            tokio::time::sleep(delay).await;

            match self.tick(&previous).await? {
                Tick::Stop(reason) => break reason,
                Tick::Done {
                    selection,
                    sent: pushed,
                    quarantined: moved,
                } => {
                    if pushed > 0 {
                        batches += 1;
                        sent += pushed;
                    }
                    quarantined += moved;
                    previous = selection;
                }
            }
        };

        info!(batches, sent, quarantined, stop = ?stop, "Dispatch finished");

        Ok(DispatchReport {
            batches,
            sent,
            quarantined,
            stop,
        })
    }

    /// One select / read / push / delete round against `previous`, the
    /// selection of the tick before
    async fn tick(&self, previous: &[QueuedItem]) -> Result<Tick> {
        let selection = self.store.list_pending(self.batch_size.max(1))?;
        if selection.is_empty() {
            return Ok(Tick::Stop(StopReason::Empty));
        }
        if selection == previous {
            warn!(
                batch = selection.len(),
                "No progress since previous push, stopping"
            );
            return Ok(Tick::Stop(StopReason::Stalled));
        }

        let mut records = Vec::with_capacity(selection.len());
        let mut readable = Vec::with_capacity(selection.len());
        let mut quarantined = 0;
        for item in &selection {
            match self.store.read(item) {
                Ok(record) => {
                    records.push(record);
                    readable.push(item);
                }
                Err(e @ (QueueError::CorruptRecord { .. } | QueueError::NotAnObject(_))) => {
                    error!(file = %item.file_name(), error = %e, "Unreadable queue record");
                    match self.store.quarantine(item) {
                        Ok(_) => {
                            quarantined += 1;
                            self.metrics.record_quarantined();
                        }
                        Err(e) => {
                            error!(file = %item.file_name(), error = %e, "Failed to quarantine record")
                        }
                    }
                }
                Err(e) => {
                    warn!(file = %item.file_name(), error = %e, "Skipping queue record");
                }
            }
        }

        if records.is_empty() {
            debug!("Nothing readable in this batch, no request sent");
            return Ok(Tick::Done {
                selection,
                sent: 0,
                quarantined,
            });
        }

        if let Err(e) = self.client.push(&records).await {
            error!(
                url = %self.client.url(),
                batch = records.len(),
                error = %e,
                "Push failed, records kept in queue"
            );
            self.metrics.push_failed();
            return Ok(Tick::Stop(StopReason::DeliveryFailed));
        }

        for item in readable {
            if let Err(e) = self.store.delete(item) {
                warn!(file = %item.file_name(), error = %e, "Failed to remove pushed record");
            }
        }

        self.metrics.batch_sent(records.len());
        info!(batch = records.len(), url = %self.client.url(), "Pushed records");

        Ok(Tick::Done {
            selection,
            sent: records.len(),
            quarantined,
        })
    }
}

#[derive(Debug)]
enum Tick {
    Stop(StopReason),
    Done {
        selection: Vec<QueuedItem>,
        sent: usize,
        quarantined: usize,
    },
}
