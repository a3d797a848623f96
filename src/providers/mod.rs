//! Data sources for the collector
//!
//! ## Key Components
//!
//! - [`Provider`] - Capability interface every platform implements
//! - [`ProviderRegistry`] - Explicit list of providers the runner may use
//! - [`PleskProvider`] - Plesk panel via its command line
//! - [`ServerProvider`] - The host's own vitals as a single record
//! - [`check`] - Diagnostics for provider authors
//!
//! ## Example
//!
//! ```rust,ignore
//! use sitekick::providers::ProviderRegistry;
//!
//! let registry = ProviderRegistry::with_defaults(host, true);
//! for provider in registry.iter() {
//!     if let Ok(Some(version)) = provider.probe().await {
//!         println!("{} applies: {}", provider.name(), version);
//!     }
//! }
//! ```

pub mod check;
pub mod plesk;
mod registry;
pub mod server;
pub mod shell;
mod traits;

pub use plesk::PleskProvider;
pub use registry::{ProviderRegistry, RegistryError};
pub use server::ServerProvider;
pub use traits::{Provider, ProviderDefaults, ProviderError};
