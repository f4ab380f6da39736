//! Cache service object
//!
//! [`WishlistCache`] is built once at process start and shared as
//! `Arc<WishlistCache>` with every request handler. State is memory-only
//! apart from the snapshot store, so there is no teardown.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, instrument};

use super::invalidation::{InvalidationOutcome, InvalidationRequest, Invalidator};
use super::orchestrator::{CacheConfig, CacheOrchestrator, Resolved};
use super::ttl::CacheStats;
use super::updater;
use crate::domain::{RecordId, Snapshot, SnapshotStore, SourceFetcher, WishlistRecord};
use crate::error::Result;

/// Read, write and invalidation entry points of the wishlist cache
pub struct WishlistCache {
    orchestrator: CacheOrchestrator,
    invalidator: Invalidator<Arc<Snapshot>>,
    /// Serializes in-process read-modify-write of the snapshot
    write_lock: Mutex<()>,
}

impl WishlistCache {
    /// Create the cache. `invalidation_secret` guards the webhook.
    pub fn new(
        config: CacheConfig,
        fetcher: Arc<dyn SourceFetcher>,
        store: Arc<dyn SnapshotStore>,
        invalidation_secret: Option<String>,
    ) -> Self {
        let orchestrator = CacheOrchestrator::new(config, fetcher, store);
        let invalidator = Invalidator::new(Arc::clone(orchestrator.memory()), invalidation_secret);
        Self {
            orchestrator,
            invalidator,
            write_lock: Mutex::new(()),
        }
    }

    /// Current best-known snapshot, or a retryable error when every layer is
    /// empty and the source is unavailable.
    pub async fn read(&self, force_refresh: bool) -> Result<Resolved> {
        self.orchestrator.resolve(force_refresh).await
    }

    /// Expire one key.
    pub fn invalidate(&self, key: &str) -> bool {
        self.invalidator.invalidate(key)
    }

    /// Expire the full snapshot entry.
    pub fn invalidate_snapshot(&self) -> bool {
        self.invalidator
            .invalidate(&self.orchestrator.config().cache_key)
    }

    pub fn clear_all(&self) {
        self.invalidator.clear_all();
    }

    /// Make an added or edited record visible immediately.
    #[instrument(skip(self, record), fields(id = record.id))]
    pub async fn add_or_update(&self, record: WishlistRecord) -> Result<Arc<Snapshot>> {
        updater::validate(&record)?;
        self.mutate("upsert", move |snapshot| updater::add_or_update(snapshot, record))
            .await
    }

    /// Make a deletion visible immediately. Unknown ids are a no-op.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: RecordId) -> Result<Arc<Snapshot>> {
        self.mutate("remove", move |snapshot| Ok(updater::remove(snapshot, id)))
            .await
    }

    /// Hit/miss counters for one key or all keys.
    pub fn stats(&self, key: Option<&str>) -> CacheStats {
        self.orchestrator.memory().get_stats(key)
    }

    /// Apply a webhook invalidation, refetching afterwards when asked to.
    #[instrument(skip(self))]
    pub async fn handle_invalidation(
        &self,
        request: InvalidationRequest,
    ) -> Result<InvalidationOutcome> {
        let (cleared, existed) = if request.all {
            self.clear_all();
            ("*".to_string(), true)
        } else {
            let key = request
                .key
                .unwrap_or_else(|| self.orchestrator.config().cache_key.clone());
            let existed = self.invalidate(&key);
            (key, existed)
        };

        let refreshed = if request.refresh {
            self.read(true).await?;
            true
        } else {
            false
        };

        Ok(InvalidationOutcome {
            cleared,
            existed,
            refreshed,
        })
    }

    pub fn invalidator(&self) -> &Invalidator<Arc<Snapshot>> {
        &self.invalidator
    }

    pub fn orchestrator(&self) -> &CacheOrchestrator {
        &self.orchestrator
    }

    async fn mutate<F>(&self, op: &'static str, apply: F) -> Result<Arc<Snapshot>>
    where
        F: FnOnce(&Snapshot) -> Result<Snapshot>,
    {
        let _guard = self.write_lock.lock().await;

        let base = match self.orchestrator.peek().await {
            Some(snapshot) => snapshot,
            None => self.orchestrator.resolve(false).await?.snapshot,
        };

        let next = Arc::new(apply(&base)?);
        self.orchestrator.install(Arc::clone(&next));
        let persisted = self.orchestrator.persist(&next).await;

        info!(
            op,
            records = next.total_count,
            persisted,
            "write applied to cached snapshot"
        );
        Ok(next)
    }
}
