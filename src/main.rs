//! wishcache server
//!
//! Serves the OSS Wishlist snapshot over HTTP, backed by the GitHub Issues
//! API and a JSON snapshot on disk.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         wishcache                                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  HTTP server │───▶│ WishlistCache│───▶│   GitHub     │       │
//! │  │  (hyper)     │    │ disk/memory  │    │   Issues     │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wishcache::adapters::{
    FileSnapshotStore, GithubConfig, GithubIssuesFetcher, InMemoryFetcher, DEFAULT_SNAPSHOT_PATH,
};
use wishcache::cache::{
    CacheConfig, WishlistCache, FULL_CACHE_KEY, MAX_FETCH_TIMEOUT, MAX_SNAPSHOT_FRESHNESS, MAX_TTL,
};
use wishcache::domain::{SnapshotStore, SourceFetcher};
use wishcache::error::{Error, Result};
use wishcache::server;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Where live data comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Source {
    /// GitHub Issues API
    Github,
    /// Empty in-memory source, for local development
    Memory,
}

/// wishcache - TTL cache and cache sync for OSS Wishlist
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP bind address
    #[arg(long, env = "WISHCACHE_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: String,

    /// Path of the JSON snapshot
    #[arg(long, env = "WISHCACHE_SNAPSHOT_PATH", default_value = DEFAULT_SNAPSHOT_PATH)]
    snapshot_path: String,

    /// Shared secret for the invalidation webhook (disabled when unset)
    #[arg(long, env = "WISHCACHE_INVALIDATION_SECRET", hide_env_values = true)]
    invalidation_secret: Option<String>,

    /// Live data source
    #[arg(long, env = "WISHCACHE_SOURCE", value_enum, default_value = "github")]
    source: Source,

    /// In-memory TTL in seconds
    #[arg(long, env = "WISHCACHE_TTL_SECONDS", default_value = "45")]
    ttl_seconds: u64,

    /// Maximum age of a disk snapshot served directly, in seconds
    #[arg(long, env = "WISHCACHE_SNAPSHOT_FRESHNESS_SECONDS", default_value = "600")]
    snapshot_freshness_seconds: u64,

    /// Live fetch timeout in milliseconds
    #[arg(long, env = "WISHCACHE_FETCH_TIMEOUT_MS", default_value = "5000")]
    fetch_timeout_ms: u64,

    /// Let every concurrent miss run its own fetch
    #[arg(long, env = "WISHCACHE_NO_SINGLE_FLIGHT")]
    no_single_flight: bool,

    /// Fail reads instead of serving stale data when the source is down
    #[arg(long, env = "WISHCACHE_NO_STALE")]
    no_stale: bool,

    /// Resolve the snapshot once before accepting requests
    #[arg(long, env = "WISHCACHE_WARM")]
    warm: bool,

    /// GitHub API base URL
    #[arg(long, env = "WISHCACHE_GITHUB_API_URL", default_value = "https://api.github.com")]
    github_api_url: String,

    /// Repository owner holding the wishlist issues
    #[arg(long, env = "WISHCACHE_GITHUB_OWNER", default_value = "oss-wishlist")]
    github_owner: String,

    /// Repository holding the wishlist issues
    #[arg(long, env = "WISHCACHE_GITHUB_REPO", default_value = "wishlists")]
    github_repo: String,

    /// Label selecting wishlist issues
    #[arg(long, env = "WISHCACHE_GITHUB_LABEL", default_value = "wishlist")]
    github_label: String,

    /// GitHub token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// Maximum issue pages fetched per refresh
    #[arg(long, env = "WISHCACHE_GITHUB_MAX_PAGES", default_value = "10")]
    github_max_pages: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn cache_config(&self) -> Result<CacheConfig> {
        let default_ttl = bounded("--ttl-seconds", Duration::from_secs(self.ttl_seconds), MAX_TTL)?;
        let snapshot_freshness = Duration::from_secs(self.snapshot_freshness_seconds);
        if snapshot_freshness > MAX_SNAPSHOT_FRESHNESS {
            return Err(Error::Config(format!(
                "--snapshot-freshness-seconds must be at most {}",
                MAX_SNAPSHOT_FRESHNESS.as_secs()
            )));
        }
        let fetch_timeout = bounded(
            "--fetch-timeout-ms",
            Duration::from_millis(self.fetch_timeout_ms),
            MAX_FETCH_TIMEOUT,
        )?;

        Ok(CacheConfig {
            default_ttl,
            snapshot_freshness,
            fetch_timeout,
            cache_key: FULL_CACHE_KEY.to_string(),
            single_flight: !self.no_single_flight,
            serve_stale_on_error: !self.no_stale,
        })
    }

    fn github_config(&self) -> GithubConfig {
        GithubConfig {
            api_url: self.github_api_url.clone(),
            owner: self.github_owner.clone(),
            repo: self.github_repo.clone(),
            label: self.github_label.clone(),
            token: self.github_token.clone().filter(|t| !t.is_empty()),
            max_pages: self.github_max_pages,
            ..Default::default()
        }
    }

    fn fetcher(&self) -> Result<Arc<dyn SourceFetcher>> {
        let fetcher: Arc<dyn SourceFetcher> = match self.source {
            Source::Github => Arc::new(GithubIssuesFetcher::new(self.github_config())?),
            Source::Memory => Arc::new(InMemoryFetcher::new(Vec::new())),
        };
        Ok(fetcher)
    }
}

/// Reject zero and anything above `max`.
fn bounded(flag: &str, value: Duration, max: Duration) -> Result<Duration> {
    if value.is_zero() {
        return Err(Error::Config(format!("{flag} must be positive")));
    }
    if value > max {
        return Err(Error::Config(format!("{flag} must be at most {max:?}")));
    }
    Ok(value)
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let config = args.cache_config()?;

    info!("Starting wishcache");
    info!("  Listen address: {}", args.listen_addr);
    info!("  Snapshot path: {}", args.snapshot_path);
    info!("  Source: {:?}", args.source);
    info!("  TTL: {:?}", config.default_ttl);
    info!("  Snapshot freshness: {:?}", config.snapshot_freshness);
    info!("  Fetch timeout: {:?}", config.fetch_timeout);
    info!("  Single-flight: {}", config.single_flight);

    if args.invalidation_secret.as_deref().map_or(true, str::is_empty) {
        warn!("No invalidation secret configured, webhook disabled");
    }

    let fetcher = args.fetcher()?;
    let store: Arc<dyn SnapshotStore> = Arc::new(FileSnapshotStore::new(&args.snapshot_path));
    let cache = Arc::new(WishlistCache::new(
        config,
        fetcher,
        store,
        args.invalidation_secret.clone(),
    ));

    if args.warm {
        match cache.read(false).await {
            Ok(resolved) => info!(
                layer = %resolved.layer,
                records = resolved.snapshot.total_count,
                "Cache warmed"
            ),
            Err(e) => error!("Cache warm-up failed: {}", e),
        }
    }

    // Stop on Ctrl-C
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        signal.cancel();
    });

    server::run(&args.listen_addr, cache, shutdown).await?;

    info!("wishcache shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
