//! In-memory adapters
//!
//! Fetcher and snapshot store backed by process memory. Used by the test
//! suite and by `--source memory` for local development.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::domain::ports::{SnapshotStore, SourceFetcher};
use crate::domain::{Snapshot, WishlistRecord};
use crate::error::{Error, Result};

// =============================================================================
// In-Memory Fetcher
// =============================================================================

/// Source fetcher serving a fixed, replaceable record set.
#[derive(Debug, Default)]
pub struct InMemoryFetcher {
    records: RwLock<Vec<WishlistRecord>>,
    calls: AtomicU64,
    failing: AtomicBool,
    delay: Option<Duration>,
}

impl InMemoryFetcher {
    pub fn new(records: Vec<WishlistRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            ..Default::default()
        }
    }

    /// Sleep for `delay` before answering each fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make subsequent fetches fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Replace the records returned by subsequent fetches.
    pub fn set_records(&self, records: Vec<WishlistRecord>) {
        *self.records.write() = records;
    }

    /// Number of fetches started so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFetcher for InMemoryFetcher {
    async fn fetch_records(&self) -> Result<Vec<WishlistRecord>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(call, "in-memory fetch");

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Fetch("in-memory source unavailable".to_string()));
        }

        Ok(self.records.read().clone())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

// =============================================================================
// In-Memory Snapshot Store
// =============================================================================

/// Snapshot store holding at most one snapshot in memory.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshot: RwLock<Option<Snapshot>>,
    writes: AtomicU64,
    fail_writes: bool,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `snapshot`.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: RwLock::new(Some(snapshot)),
            ..Default::default()
        }
    }

    /// Store whose writes always fail, like a read-only filesystem.
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Default::default()
        }
    }

    /// Successful writes so far
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<Snapshot> {
        self.snapshot.read().clone()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn read(&self) -> Result<Option<Snapshot>> {
        Ok(self.snapshot.read().clone())
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<()> {
        if self.fail_writes {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only snapshot store",
            )));
        }
        *self.snapshot.write() = Some(snapshot.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
