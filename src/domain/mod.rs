//! Domain Layer
//!
//! - **Snapshot** (`snapshot.rs`) - wishlist records and the aggregate document
//! - **Ports** (`ports.rs`) - trait abstractions for the source of truth and
//!   durable snapshot storage

pub mod ports;
pub mod snapshot;

pub use ports::{SnapshotStore, SourceFetcher};
pub use snapshot::{RecordId, Snapshot, WishlistRecord, SNAPSHOT_VERSION};
