//! Prometheus metrics for the cache.
//!
//! Registered in the default registry on first use and exposed by the
//! `/metrics` route.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

/// Reads served, labelled by the layer that answered
pub static READS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "wishcache_reads_total",
        "Snapshot reads by answering cache layer",
        &["layer"]
    )
    .expect("wishcache_reads_total registers once")
});

/// Live fetch failures, labelled `timeout` or `source`
pub static FETCH_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "wishcache_fetch_failures_total",
        "Failed live fetches from the source of truth",
        &["kind"]
    )
    .expect("wishcache_fetch_failures_total registers once")
});

pub static INVALIDATIONS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "wishcache_invalidations_total",
        "Cache keys cleared by the invalidation surface"
    )
    .expect("wishcache_invalidations_total registers once")
});

pub static PERSIST_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "wishcache_persist_failures_total",
        "Snapshot writes to durable storage that failed"
    )
    .expect("wishcache_persist_failures_total registers once")
});

/// Record count of the last snapshot served
pub static RECORDS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "wishcache_records",
        "Records in the most recently served snapshot"
    )
    .expect("wishcache_records registers once")
});

/// Render every registered metric in the text exposition format.
pub fn render() -> crate::error::Result<(String, Vec<u8>)> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| crate::error::Error::Internal(format!("metrics encoding failed: {}", e)))?;
    Ok((encoder.format_type().to_string(), buffer))
}
