//! Domain Ports (Port/Adapter Pattern)
//!
//! The cache core depends only on these traits. Adapters in
//! [`crate::adapters`] provide the concrete GitHub, filesystem and in-memory
//! implementations.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   Cache Core                              │
//! │   CacheOrchestrator │ updater │ Invalidator               │
//! └──────────────────────────────────────────────────────────┘
//!                      │ ports
//!          ┌───────────┴────────────┐
//!          ▼                        ▼
//!   SourceFetcher             SnapshotStore
//!   (GitHub, in-memory)       (file, in-memory)
//! ```

use async_trait::async_trait;

use super::snapshot::{Snapshot, WishlistRecord};
use crate::error::Result;

// =============================================================================
// Source Fetcher Port
// =============================================================================

/// Produces the current record set from the source of truth.
///
/// The core makes a single attempt per miss and applies its own timeout, so
/// implementations should not retry internally.
///
/// # Example
///
/// ```ignore
/// struct DatabaseFetcher { pool: PgPool }
///
/// #[async_trait]
/// impl SourceFetcher for DatabaseFetcher {
///     async fn fetch_records(&self) -> Result<Vec<WishlistRecord>> {
///         // SELECT ... FROM wishlists
///     }
///
///     fn name(&self) -> &str {
///         "database"
///     }
/// }
/// ```
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch every record. Identity keys must be stable across calls.
    async fn fetch_records(&self) -> Result<Vec<WishlistRecord>>;

    /// Name used in logs and timeout errors.
    fn name(&self) -> &str;
}

// =============================================================================
// Snapshot Store Port
// =============================================================================

/// Durable home of the last full snapshot (the `wishlists.json` file).
///
/// Writers must replace the document atomically so concurrent readers never
/// observe a partial snapshot.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read the stored snapshot, `Ok(None)` when nothing has been written yet.
    async fn read(&self) -> Result<Option<Snapshot>>;

    /// Replace the stored snapshot.
    async fn write(&self, snapshot: &Snapshot) -> Result<()>;
}
