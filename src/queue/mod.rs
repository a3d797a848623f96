pub mod store;

pub use store::{DomainRecord, QueueError, QueueStore, QueuedItem, SEQUENCE_WIDTH, sanitize_domain};
