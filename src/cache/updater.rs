//! Incremental Cache Updater
//!
//! Applies a single record mutation to an already-fetched snapshot so writes
//! become visible before the next full refresh. Aggregates are recomputed from
//! the whole record list on every mutation (O(n)).

use tracing::debug;

use crate::domain::{RecordId, Snapshot, WishlistRecord};
use crate::error::{Error, Result};

/// Insert `record`, replacing any record with the same identity key.
///
/// A record without an identity key (id `0`) is rejected and `snapshot` is
/// left untouched.
pub fn add_or_update(snapshot: &Snapshot, record: WishlistRecord) -> Result<Snapshot> {
    validate(&record)?;

    let mut next = snapshot.clone();
    let replaced = next.records.iter().any(|r| r.id == record.id);
    next.records.retain(|r| r.id != record.id);
    next.records.push(record);
    next.recompute();

    debug!(
        replaced,
        total = next.total_count,
        "applied record upsert to snapshot"
    );
    Ok(next)
}

/// Drop the record with `id`.
///
/// Removing an unknown id is not an error; the snapshot is returned with the
/// same records and a fresh timestamp.
pub fn remove(snapshot: &Snapshot, id: RecordId) -> Snapshot {
    let mut next = snapshot.clone();
    let before = next.records.len();
    next.records.retain(|r| r.id != id);
    next.recompute();

    debug!(
        id,
        removed = before != next.records.len(),
        total = next.total_count,
        "applied record removal to snapshot"
    );
    next
}

pub(crate) fn validate(record: &WishlistRecord) -> Result<()> {
    if record.id == 0 {
        return Err(Error::InvalidRecord(format!(
            "record '{}' has no identity key",
            record.title
        )));
    }
    Ok(())
}
