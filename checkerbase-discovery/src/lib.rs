//! Mail server autodiscovery: four independent strategies (ISPDB directory,
//! well-known autoconfig URLs, MX-derived provider matching, and live IMAP
//! probing) behind a single-flight tracker and a durable SQLite cache.
//!
//! [`service::DiscoveryService::get_candidates`] is the sole entry point a
//! checker needs: verified cache -> candidate cache -> coalesced live
//! discovery, in that order.

pub mod autoconfig;
pub mod error;
pub mod model;
pub mod registry;
pub mod service;
pub mod strategies;
pub mod strategy;
pub mod tracker;

pub use error::{DiscoveryError, Result};
pub use model::{Security, ServerConfig, Source, UsernameFormat};
pub use registry::ServerRegistry;
pub use service::{DiscoveryConfig, DiscoveryService};
pub use strategies::{DirectoryLookupStrategy, MxProviderStrategy, ProbeStrategy, WellKnownUrlsStrategy};
pub use strategy::DiscoveryStrategy;
pub use tracker::PendingDiscoveryTracker;
