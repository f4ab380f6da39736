//! Cache Orchestrator
//!
//! Resolves a read to a snapshot through an ordered fallback chain:
//!
//! ```text
//! read ──▶ Disk snapshot (fresh?) ──▶ Memory (TTL) ──▶ Live fetch (timeout)
//!               │ hit                    │ hit             │ ok: store memory,
//!               ▼                        ▼                 │     persist async
//!             serve                    serve               ▼
//!                                                     serve / stale / error
//! ```
//!
//! Concurrent misses on the same key share one in-flight fetch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument, warn};

use super::ttl::TtlCache;
use super::{DEFAULT_FETCH_TIMEOUT, DEFAULT_SNAPSHOT_FRESHNESS, DEFAULT_TTL, FULL_CACHE_KEY};
use crate::domain::{Snapshot, SnapshotStore, SourceFetcher};
use crate::error::{FetchFailure, Result};
use crate::telemetry;

/// Layer that answered a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLayer {
    /// On-disk snapshot within its freshness window
    Disk,
    /// In-memory TTL cache
    Memory,
    /// Fresh fetch from the source of truth
    Live,
    /// Last known good data served after a failed fetch
    Stale,
}

impl CacheLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheLayer::Disk => "disk",
            CacheLayer::Memory => "memory",
            CacheLayer::Live => "live",
            CacheLayer::Stale => "stale",
        }
    }
}

impl std::fmt::Display for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL of in-memory entries
    pub default_ttl: Duration,
    /// Maximum age at which the disk snapshot is served directly
    pub snapshot_freshness: Duration,
    /// Budget for one live fetch
    pub fetch_timeout: Duration,
    /// Key of the full snapshot in the memory cache
    pub cache_key: String,
    /// Share one live fetch between concurrent misses
    pub single_flight: bool,
    /// Serve the last known good snapshot when a live fetch fails
    pub serve_stale_on_error: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            snapshot_freshness: DEFAULT_SNAPSHOT_FRESHNESS,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            cache_key: FULL_CACHE_KEY.to_string(),
            single_flight: true,
            serve_stale_on_error: true,
        }
    }
}

/// Outcome of a read
#[derive(Debug, Clone)]
pub struct Resolved {
    pub snapshot: Arc<Snapshot>,
    pub layer: CacheLayer,
    pub latency: Duration,
}

type FetchOutcome = std::result::Result<Arc<Snapshot>, FetchFailure>;
type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// Layered read path over disk, memory and the live source
pub struct CacheOrchestrator {
    config: CacheConfig,
    memory: Arc<TtlCache<Arc<Snapshot>>>,
    fetcher: Arc<dyn SourceFetcher>,
    store: Arc<dyn SnapshotStore>,
    last_known_good: Arc<RwLock<Option<Arc<Snapshot>>>>,
    in_flight: DashMap<String, SharedFetch>,
    /// Serializes writes to the snapshot store
    persist_lock: Arc<AsyncMutex<()>>,
}

impl CacheOrchestrator {
    pub fn new(
        config: CacheConfig,
        fetcher: Arc<dyn SourceFetcher>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        let memory = Arc::new(TtlCache::new(config.default_ttl));
        Self {
            config,
            memory,
            fetcher,
            store,
            last_known_good: Arc::new(RwLock::new(None)),
            in_flight: DashMap::new(),
            persist_lock: Arc::new(AsyncMutex::new(())),
        }
    }

    /// Resolve the current snapshot.
    ///
    /// `force_refresh` skips the disk and memory layers and never falls back
    /// to stale data.
    #[instrument(skip(self), fields(key = %self.config.cache_key))]
    pub async fn resolve(&self, force_refresh: bool) -> Result<Resolved> {
        let start = Instant::now();
        let mut stale_disk = None;

        if !force_refresh {
            match self.read_disk().await {
                Some(snapshot) if self.is_fresh(&snapshot) && !self.disk_is_behind(&snapshot) => {
                    debug!("serving fresh disk snapshot");
                    let snapshot = Arc::new(snapshot);
                    self.remember(&snapshot);
                    return Ok(self.served(snapshot, CacheLayer::Disk, start));
                }
                Some(snapshot) => stale_disk = Some(snapshot),
                None => {}
            }

            if let Some(snapshot) = self.memory.get(&self.config.cache_key) {
                return Ok(self.served(snapshot, CacheLayer::Memory, start));
            }
        }

        match self.fetch_live().await {
            Ok(snapshot) => {
                info!(records = snapshot.total_count, "refreshed snapshot from live source");
                Ok(self.served(snapshot, CacheLayer::Live, start))
            }
            Err(failure) => {
                telemetry::FETCH_FAILURES
                    .with_label_values(&[failure.kind()])
                    .inc();

                if !force_refresh && self.config.serve_stale_on_error {
                    if let Some(snapshot) = self.stale_candidate(stale_disk) {
                        warn!(
                            error = ?failure,
                            generated_at = %snapshot.generated_at,
                            "live fetch failed, serving stale snapshot"
                        );
                        return Ok(self.served(snapshot, CacheLayer::Stale, start));
                    }
                }

                warn!(error = ?failure, force_refresh, "live fetch failed with nothing to fall back to");
                Err(failure.into())
            }
        }
    }

    /// Best snapshot known without touching the live source.
    ///
    /// The newest of memory, last known good and disk by `generated_at`.
    /// A disk copy written by another process wins over an older in-process
    /// view and is remembered as last known good. Ties keep the in-process
    /// copy.
    pub async fn peek(&self) -> Option<Arc<Snapshot>> {
        let in_process = newest(
            self.memory.get(&self.config.cache_key),
            self.last_known_good(),
        );

        match self.read_disk().await {
            Some(disk) if !self.disk_is_behind(&disk) => {
                let in_process_is_newer = in_process
                    .as_ref()
                    .is_some_and(|known| known.generated_at >= disk.generated_at);
                if in_process_is_newer {
                    return in_process;
                }
                let disk = Arc::new(disk);
                self.remember(&disk);
                Some(disk)
            }
            _ => in_process,
        }
    }

    /// Make `snapshot` the current view in memory and last known good.
    pub fn install(&self, snapshot: Arc<Snapshot>) {
        self.memory
            .set(self.config.cache_key.clone(), Arc::clone(&snapshot), None);
        self.remember(&snapshot);
    }

    /// Write `snapshot` to durable storage, logging instead of failing.
    ///
    /// Returns whether the snapshot was written. A snapshot older than the
    /// stored one is skipped.
    pub async fn persist(&self, snapshot: &Snapshot) -> bool {
        persist_snapshot(self.store.as_ref(), &self.persist_lock, snapshot).await
    }

    pub fn memory(&self) -> &Arc<TtlCache<Arc<Snapshot>>> {
        &self.memory
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn last_known_good(&self) -> Option<Arc<Snapshot>> {
        self.last_known_good.read().clone()
    }

    /// Number of live fetches currently in flight
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    async fn read_disk(&self) -> Option<Snapshot> {
        match self.store.read().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "failed to read snapshot from durable store");
                None
            }
        }
    }

    fn is_fresh(&self, snapshot: &Snapshot) -> bool {
        let freshness = chrono::Duration::from_std(self.config.snapshot_freshness)
            .unwrap_or(chrono::Duration::MAX);
        snapshot.age(Utc::now()) < freshness
    }

    /// The disk copy is older than what this process already knows, e.g.
    /// after a write whose persistence failed or has not landed yet.
    fn disk_is_behind(&self, snapshot: &Snapshot) -> bool {
        self.last_known_good
            .read()
            .as_ref()
            .is_some_and(|known| known.generated_at > snapshot.generated_at)
    }

    fn remember(&self, snapshot: &Arc<Snapshot>) {
        let mut slot = self.last_known_good.write();
        let newer = slot
            .as_ref()
            .map_or(true, |known| snapshot.generated_at >= known.generated_at);
        if newer {
            *slot = Some(Arc::clone(snapshot));
        }
    }

    fn stale_candidate(&self, stale_disk: Option<Snapshot>) -> Option<Arc<Snapshot>> {
        let known = self.last_known_good();
        match (known, stale_disk) {
            (Some(known), Some(disk)) if disk.generated_at > known.generated_at => {
                Some(Arc::new(disk))
            }
            (Some(known), _) => Some(known),
            (None, disk) => disk.map(Arc::new),
        }
    }

    fn served(&self, snapshot: Arc<Snapshot>, layer: CacheLayer, start: Instant) -> Resolved {
        telemetry::READS.with_label_values(&[layer.as_str()]).inc();
        telemetry::RECORDS.set(snapshot.total_count as i64);
        Resolved {
            snapshot,
            layer,
            latency: start.elapsed(),
        }
    }

    async fn fetch_live(&self) -> FetchOutcome {
        if !self.config.single_flight {
            return self.fetch_task().await;
        }

        let key = self.config.cache_key.clone();
        let shared = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                debug!("joining in-flight fetch");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let fetch = self.fetch_task().boxed().shared();
                entry.insert(fetch.clone());
                fetch
            }
        };

        let outcome = shared.clone().await;
        // `shared` itself was never polled, so it still identifies the slot
        self.in_flight
            .remove_if(&key, |_, current| current.ptr_eq(&shared));
        outcome
    }

    /// One live fetch; on success the result lands in memory, in last known
    /// good, and (detached) on disk.
    fn fetch_task(&self) -> impl std::future::Future<Output = FetchOutcome> + Send + 'static {
        let fetcher = Arc::clone(&self.fetcher);
        let store = Arc::clone(&self.store);
        let persist_lock = Arc::clone(&self.persist_lock);
        let memory = Arc::clone(&self.memory);
        let last_known_good = Arc::clone(&self.last_known_good);
        let key = self.config.cache_key.clone();
        let timeout = self.config.fetch_timeout;

        async move {
            let source_name = fetcher.name().to_string();
            debug!(source = %source_name, ?timeout, "starting live fetch");

            let records = match tokio::time::timeout(timeout, fetcher.fetch_records()).await {
                Ok(Ok(records)) => records,
                Ok(Err(e)) => return Err(FetchFailure::Source(e.to_string())),
                Err(_) => {
                    return Err(FetchFailure::Timeout {
                        source_name,
                        timeout,
                    })
                }
            };

            let snapshot = Arc::new(Snapshot::from_records(records));
            memory.set(key, Arc::clone(&snapshot), None);
            *last_known_good.write() = Some(Arc::clone(&snapshot));

            let detached = Arc::clone(&snapshot);
            tokio::spawn(async move {
                let superseded = last_known_good
                    .read()
                    .as_ref()
                    .is_some_and(|known| known.generated_at > detached.generated_at);
                if superseded {
                    debug!("skipping persist of superseded snapshot");
                    return;
                }
                persist_snapshot(store.as_ref(), &persist_lock, &detached).await;
            });

            Ok(snapshot)
        }
    }
}

fn newest(a: Option<Arc<Snapshot>>, b: Option<Arc<Snapshot>>) -> Option<Arc<Snapshot>> {
    match (a, b) {
        (Some(a), Some(b)) if b.generated_at > a.generated_at => Some(b),
        (Some(a), _) => Some(a),
        (None, b) => b,
    }
}

/// Write `snapshot` unless the store already holds a newer one.
///
/// Holding `lock` across the check and the write keeps writers from this
/// process in order, whichever path they come from.
async fn persist_snapshot(
    store: &dyn SnapshotStore,
    lock: &AsyncMutex<()>,
    snapshot: &Snapshot,
) -> bool {
    let _guard = lock.lock().await;

    match store.read().await {
        Ok(Some(current)) if current.generated_at > snapshot.generated_at => {
            debug!(
                stored_at = %current.generated_at,
                generated_at = %snapshot.generated_at,
                "stored snapshot is newer, skipping persist"
            );
            return false;
        }
        Ok(_) => {}
        Err(e) => debug!(error = %e, "could not read stored snapshot before persisting"),
    }

    match store.write(snapshot).await {
        Ok(()) => {
            debug!(records = snapshot.total_count, "persisted snapshot");
            true
        }
        Err(e) => {
            telemetry::PERSIST_FAILURES.inc();
            warn!(error = %e, "failed to persist snapshot, memory cache stays authoritative");
            false
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
