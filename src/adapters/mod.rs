//! Infrastructure Adapters
//!
//! Implementations of the domain ports, following the Port/Adapter
//! (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │            SourceFetcher │ SnapshotStore                    │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ GithubIssuesFetcher │ FileSnapshotStore                     │ │
//! │  │ InMemoryFetcher     │ InMemorySnapshotStore                 │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use wishcache::adapters::{FileSnapshotStore, GithubConfig, GithubIssuesFetcher};
//! use wishcache::domain::ports::SourceFetcher;
//!
//! let fetcher = GithubIssuesFetcher::new(GithubConfig::default())?;
//! let store = FileSnapshotStore::new("public/wishlists.json");
//!
//! let records = fetcher.fetch_records().await?;
//! ```

mod file_store;
mod github;
mod memory;

pub use file_store::{FileSnapshotStore, DEFAULT_SNAPSHOT_PATH};
pub use github::{GithubConfig, GithubIssuesFetcher};
pub use memory::{InMemoryFetcher, InMemorySnapshotStore};
