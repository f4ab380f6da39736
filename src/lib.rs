//! wishcache - TTL cache and cache synchronization for OSS Wishlist
//!
//! Serves the wishlist snapshot (`wishlists.json`) from whichever of several
//! sources is fresh enough, and keeps them converging after writes.
//!
//! # Architecture
//!
//! ```text
//!   HTTP (server) ──▶ WishlistCache ──▶ CacheOrchestrator
//!                          │                 │
//!                          │        disk ─▶ memory ─▶ live fetch
//!                          │      (SnapshotStore) (TtlCache) (SourceFetcher)
//!                          │
//!                          ├──▶ updater      (add_or_update / remove)
//!                          └──▶ Invalidator  (write path, webhook)
//! ```
//!
//! Reads are bounded-stale: an in-memory entry lives for its TTL (45s by
//! default) and a disk snapshot is trusted for its freshness window (10
//! minutes). Writes patch the current snapshot in place so they are visible
//! before the next full refresh.
//!
//! # Modules
//!
//! - [`adapters`] - GitHub, filesystem and in-memory implementations of the ports
//! - [`cache`] - TTL store, orchestrator, incremental updater, invalidation
//! - [`domain`] - records, snapshots and port traits
//! - [`error`] - Error types
//! - [`server`] - hyper HTTP surface
//! - [`telemetry`] - Prometheus metrics

pub mod adapters;
pub mod cache;
pub mod domain;
pub mod error;
pub mod server;
pub mod telemetry;

// Re-export commonly used types
pub use cache::{CacheConfig, CacheLayer, Resolved, TtlCache, WishlistCache};
pub use domain::{Snapshot, WishlistRecord};
pub use error::{Error, Result};
