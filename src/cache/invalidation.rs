//! Invalidation Surface
//!
//! Forcibly expires cache keys, either from the write path right after a
//! mutation or from an out-of-band notifier (the batch job webhook).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::ttl::TtlCache;
use crate::telemetry;

/// Header carrying the webhook shared secret
pub const SECRET_HEADER: &str = "x-cache-secret";

/// Webhook payload. An empty body clears the default key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InvalidationRequest {
    /// Key to clear; `None` clears the default snapshot key
    #[serde(default)]
    pub key: Option<String>,
    /// Clear every key instead of one
    #[serde(default)]
    pub all: bool,
    /// Refetch right away so the disk snapshot is rewritten too
    #[serde(default)]
    pub refresh: bool,
}

/// What an invalidation did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationOutcome {
    /// Keys that were requested to be cleared (`*` for all)
    pub cleared: String,
    /// Whether a matching entry existed
    pub existed: bool,
    /// Whether a live refetch ran afterwards
    pub refreshed: bool,
}

/// Clears entries of a [`TtlCache`]; never fails and never blocks.
pub struct Invalidator<V> {
    cache: Arc<TtlCache<V>>,
    secret: Option<String>,
}

impl<V: Clone> Invalidator<V> {
    /// `secret` guards the external webhook; `None` disables it.
    pub fn new(cache: Arc<TtlCache<V>>, secret: Option<String>) -> Self {
        Self {
            cache,
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    /// Expire one key; returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        let existed = self.cache.clear(key);
        telemetry::INVALIDATIONS.inc();
        info!(key, existed, "cache key invalidated");
        existed
    }

    /// Expire every key and reset statistics.
    pub fn clear_all(&self) {
        self.cache.clear_all();
        telemetry::INVALIDATIONS.inc();
        info!("all cache keys invalidated");
    }

    /// Whether the webhook accepts invalidations at all
    pub fn webhook_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Check a caller-provided secret.
    pub fn authorize(&self, provided: Option<&str>) -> bool {
        match (&self.secret, provided) {
            (Some(expected), Some(provided)) => {
                constant_time_eq(expected.as_bytes(), provided.as_bytes())
            }
            _ => false,
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
