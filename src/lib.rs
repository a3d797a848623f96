pub mod backoff;
pub mod collector;
pub mod config;
pub mod dispatcher;
pub mod gdpr;
pub mod hooks;
pub mod host;
pub mod humanize;
pub mod observability;
pub mod providers;
pub mod queue;
pub mod runner;
pub mod server;
