//! Wishlist Cache Core
//!
//! Layered read path and write-path synchronization for the wishlist
//! snapshot.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          WishlistCache (service)                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────┐  ┌──────────────────┐  ┌──────────────────┐   │
//! │  │  CacheOrchestrator   │  │ Incremental      │  │  Invalidator     │   │
//! │  │ disk → memory → live │  │ Updater          │  │ (write path,     │   │
//! │  │ (single-flight)      │  │ upsert / remove  │  │  webhook)        │   │
//! │  └──────────┬───────────┘  └──────────────────┘  └────────┬─────────┘   │
//! │             └───────────────────┬─────────────────────────┘             │
//! │                       ┌──────────────────┐                               │
//! │                       │    TtlCache      │                               │
//! │                       └──────────────────┘                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod invalidation;
pub mod orchestrator;
pub mod service;
pub mod ttl;
pub mod updater;

use std::time::Duration;

// Re-export primary types
pub use invalidation::{InvalidationOutcome, InvalidationRequest, Invalidator, SECRET_HEADER};
pub use orchestrator::{CacheConfig, CacheLayer, CacheOrchestrator, Resolved};
pub use service::WishlistCache;
pub use ttl::{CacheStats, KeyStats, TtlCache};
pub use updater::{add_or_update, remove};

/// Default TTL of in-memory entries (45s)
pub const DEFAULT_TTL: Duration = Duration::from_secs(45);

/// Maximum age of a disk snapshot that is served directly (10 minutes)
pub const DEFAULT_SNAPSHOT_FRESHNESS: Duration = Duration::from_secs(10 * 60);

/// Budget for one live fetch (5s)
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest TTL an entry can have; longer requests are clamped (1 day)
pub const MAX_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound of the configurable disk freshness window (7 days)
pub const MAX_SNAPSHOT_FRESHNESS: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Upper bound of the configurable fetch timeout (5 minutes)
pub const MAX_FETCH_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Memory cache key of the full snapshot
pub const FULL_CACHE_KEY: &str = "full_cache";
