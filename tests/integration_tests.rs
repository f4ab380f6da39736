//! wishcache Integration Tests
//!
//! End-to-end behavior through the public API:
//! - TTL store expiry and statistics
//! - Layered reads over a real snapshot file
//! - Write path visibility and invalidation
//! - HTTP surface over a real socket

use std::sync::Arc;
use std::time::Duration;

use wishcache::adapters::{FileSnapshotStore, InMemoryFetcher};
use wishcache::cache::{CacheConfig, CacheLayer, InvalidationRequest, WishlistCache};
use wishcache::domain::{Snapshot, SnapshotStore, SourceFetcher, WishlistRecord};

fn records(ids: &[u64]) -> Vec<WishlistRecord> {
    ids.iter()
        .map(|id| {
            WishlistRecord::new(*id, format!("wishlist {id}"))
                .approved(id % 2 == 0)
                .with_tags(["rust"])
        })
        .collect()
}

fn file_cache(
    dir: &tempfile::TempDir,
    fetcher: &Arc<InMemoryFetcher>,
    secret: Option<&str>,
) -> (Arc<FileSnapshotStore>, WishlistCache) {
    let store = Arc::new(FileSnapshotStore::new(dir.path().join("wishlists.json")));
    let cache = WishlistCache::new(
        CacheConfig::default(),
        Arc::clone(fetcher) as Arc<dyn SourceFetcher>,
        Arc::clone(&store) as Arc<dyn SnapshotStore>,
        secret.map(String::from),
    );
    (store, cache)
}

async fn wait_for_file(store: &FileSnapshotStore) -> Snapshot {
    for _ in 0..200 {
        if let Ok(Some(snapshot)) = store.read().await {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("snapshot was never persisted to {}", store.path().display());
}

async fn wait_for_count(store: &FileSnapshotStore, count: usize) -> Snapshot {
    for _ in 0..200 {
        if let Ok(Some(snapshot)) = store.read().await {
            if snapshot.total_count == count {
                return snapshot;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("snapshot with {} records never reached disk", count);
}

// =============================================================================
// TTL Store
// =============================================================================

mod ttl_tests {
    use super::*;
    use wishcache::cache::TtlCache;

    #[tokio::test(start_paused = true)]
    async fn test_expiry_with_stats() {
        let cache = TtlCache::new(Duration::from_secs(45));
        cache.set("k", "v".to_string(), Some(Duration::from_secs(1)));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(cache.get("k").as_deref(), Some("v"));

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(cache.get("k").is_none());

        let stats = cache.get_stats(Some("k"));
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn test_five_hits_then_three_misses() {
        let cache = TtlCache::new(Duration::from_secs(45));
        cache.set("k", 1u32, None);
        for _ in 0..5 {
            cache.get("k");
        }
        cache.clear("k");
        for _ in 0..3 {
            cache.get("k");
        }

        let stats = cache.get_stats(Some("k"));
        assert_eq!((stats.hits, stats.misses), (5, 3));
    }
}

// =============================================================================
// Layered Reads
// =============================================================================

mod read_path_tests {
    use super::*;

    #[tokio::test]
    async fn test_cold_start_fetches_then_persists() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(InMemoryFetcher::new(records(&[1, 2, 3])));
        let (store, cache) = file_cache(&dir, &fetcher, None);

        let resolved = tokio_test::assert_ok!(cache.read(false).await);
        assert_eq!(resolved.layer, CacheLayer::Live);
        assert_eq!(resolved.snapshot.total_count, 3);

        let on_disk = wait_for_file(&store).await;
        assert_eq!(on_disk.records, resolved.snapshot.records);
    }

    #[tokio::test]
    async fn test_fresh_file_is_served_without_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(InMemoryFetcher::new(records(&[1, 2, 3])));
        let (store, cache) = file_cache(&dir, &fetcher, None);

        let mut snapshot = Snapshot::from_records(records(&[9]));
        snapshot.generated_at -= chrono::Duration::minutes(1);
        store.write(&snapshot).await.unwrap();

        let resolved = cache.read(false).await.unwrap();
        assert_eq!(resolved.layer, CacheLayer::Disk);
        assert_eq!(resolved.snapshot.total_count, 1);
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_file_falls_through_to_live_then_memory() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(InMemoryFetcher::new(records(&[1, 2, 3])));
        let (store, cache) = file_cache(&dir, &fetcher, None);

        let mut snapshot = Snapshot::from_records(records(&[9]));
        snapshot.generated_at -= chrono::Duration::minutes(11);
        store.write(&snapshot).await.unwrap();

        let first = cache.read(false).await.unwrap();
        assert_eq!(first.layer, CacheLayer::Live);
        assert_eq!(first.snapshot.total_count, 3);
        assert_eq!(fetcher.calls(), 1);

        // Second read is answered by disk (once persisted) or memory, never live
        let second = cache.read(false).await.unwrap();
        assert_ne!(second.layer, CacheLayer::Live);
        assert_eq!(second.snapshot.total_count, 3);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_always_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(InMemoryFetcher::new(records(&[1])));
        let (store, cache) = file_cache(&dir, &fetcher, None);
        cache.read(false).await.unwrap();
        wait_for_file(&store).await;

        fetcher.set_records(records(&[1, 2]));
        let resolved = cache.read(true).await.unwrap();

        assert_eq!(resolved.layer, CacheLayer::Live);
        assert_eq!(resolved.snapshot.total_count, 2);
        assert_eq!(fetcher.calls(), 2);

        // Both layers now hold the refreshed snapshot
        assert_eq!(
            cache.orchestrator().memory().get("full_cache").unwrap().total_count,
            2
        );
        let on_disk = wait_for_count(&store, 2).await;
        assert_eq!(on_disk.records, resolved.snapshot.records);
    }

    #[tokio::test]
    async fn test_source_outage_serves_stale_then_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(InMemoryFetcher::new(records(&[1, 2])));
        let (store, cache) = file_cache(&dir, &fetcher, None);

        let mut snapshot = Snapshot::from_records(records(&[5]));
        snapshot.generated_at -= chrono::Duration::hours(2);
        store.write(&snapshot).await.unwrap();

        fetcher.set_failing(true);
        let stale = cache.read(false).await.unwrap();
        assert_eq!(stale.layer, CacheLayer::Stale);
        assert!(stale.snapshot.contains(5));

        tokio_test::assert_err!(cache.read(true).await);

        fetcher.set_failing(false);
        let fresh = cache.read(false).await.unwrap();
        assert_eq!(fresh.layer, CacheLayer::Live);
        assert_eq!(fresh.snapshot.total_count, 2);
    }

    #[tokio::test]
    async fn test_concurrent_cold_reads_share_one_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(
            InMemoryFetcher::new(records(&[1, 2, 3])).with_delay(Duration::from_millis(50)),
        );
        let (_store, cache) = file_cache(&dir, &fetcher, None);
        let cache = Arc::new(cache);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.read(false).await })
            })
            .collect();

        for handle in handles {
            let resolved = handle.await.unwrap().unwrap();
            assert_eq!(resolved.snapshot.total_count, 3);
        }
        assert_eq!(fetcher.calls(), 1);
    }
}

// =============================================================================
// Write Path
// =============================================================================

mod write_path_tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_and_remove_are_visible_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(InMemoryFetcher::new(records(&[1, 2])));
        let (store, cache) = file_cache(&dir, &fetcher, None);
        cache.read(false).await.unwrap();

        let added = WishlistRecord::new(3, "new wishlist")
            .approved(true)
            .with_tags(["go"]);
        cache.add_or_update(added).await.unwrap();

        let resolved = cache.read(false).await.unwrap();
        assert_eq!(resolved.snapshot.total_count, 3);
        assert_eq!(resolved.snapshot.derived_stats.get("go"), Some(&1));
        assert!(resolved.snapshot.is_consistent());

        cache.remove(1).await.unwrap();
        cache.remove(1).await.unwrap();

        let resolved = cache.read(false).await.unwrap();
        assert_eq!(resolved.snapshot.total_count, 2);
        assert!(!resolved.snapshot.contains(1));

        let on_disk = store.read().await.unwrap().unwrap();
        assert_eq!(on_disk.total_count, 2);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_write_after_batch_rewrite_keeps_batch_records() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(InMemoryFetcher::new(records(&[1])));
        let (store, cache) = file_cache(&dir, &fetcher, Some("s3cret"));
        let live = cache.read(false).await.unwrap().snapshot;
        wait_for_file(&store).await;

        let mut batch = Snapshot::from_records(records(&[1, 2, 3]));
        batch.generated_at = live.generated_at + chrono::Duration::seconds(1);
        store.write(&batch).await.unwrap();
        cache
            .handle_invalidation(InvalidationRequest::default())
            .await
            .unwrap();

        let written = cache
            .add_or_update(WishlistRecord::new(10, "ten"))
            .await
            .unwrap();
        assert_eq!(written.total_count, 4);

        let on_disk = wait_for_count(&store, 4).await;
        assert!(on_disk.contains(2) && on_disk.contains(10));
        assert_eq!(cache.read(false).await.unwrap().snapshot.total_count, 4);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_webhook_refresh_rewrites_fresh_disk_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(InMemoryFetcher::new(records(&[1])));
        let (store, cache) = file_cache(&dir, &fetcher, Some("s3cret"));

        // Batch job produced a fresh file; the source has moved on since
        store
            .write(&Snapshot::from_records(records(&[1])))
            .await
            .unwrap();
        fetcher.set_records(records(&[1, 2, 3, 4]));
        assert_eq!(cache.read(false).await.unwrap().snapshot.total_count, 1);

        let outcome = cache
            .handle_invalidation(InvalidationRequest {
                refresh: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(outcome.refreshed);

        let resolved = cache.read(false).await.unwrap();
        assert_eq!(resolved.snapshot.total_count, 4);
    }
}

// =============================================================================
// HTTP Surface
// =============================================================================

mod http_tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_util::sync::CancellationToken;
    use wishcache::server;

    #[tokio::test]
    async fn test_server_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(InMemoryFetcher::new(records(&[1, 2])));
        let (_store, cache) = file_cache(&dir, &fetcher, Some("s3cret"));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(server::serve(listener, Arc::new(cache), shutdown.clone()));

        let client = reqwest::Client::new();

        let response = client
            .get(format!("{base}/wishlists.json"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()[server::LAYER_HEADER], "live");
        let snapshot: Snapshot = response.json().await.unwrap();
        assert_eq!(snapshot.total_count, 2);

        let response = client
            .post(format!("{base}/api/cache/invalidate"))
            .body(r#"{"key": "full_cache"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 401);

        let response = client
            .post(format!("{base}/api/cache/invalidate"))
            .header("x-cache-secret", "s3cret")
            .body(r#"{"key": "full_cache"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let response = client.get(format!("{base}/healthz")).send().await.unwrap();
        assert_eq!(response.text().await.unwrap(), "ok");

        let metrics = client
            .get(format!("{base}/metrics"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(metrics.contains("wishcache_reads_total"));

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }
}
