//! Wishlist records and the full snapshot document.
//!
//! A [`Snapshot`] is what `wishlists.json` contains: every record plus the
//! aggregate counts derived from them. Aggregates are never adjusted in place;
//! [`Snapshot::recompute`] rebuilds them from the record list so they cannot
//! drift from the records.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Stable identity of a record (the GitHub issue number).
pub type RecordId = u64;

/// One maintainer wishlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistRecord {
    /// Identity key; zero is reserved as "missing"
    pub id: RecordId,
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub maintainer: String,
    /// Approved for public listing
    #[serde(default)]
    pub approved: bool,
    /// Technologies the project uses
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Services the maintainer is asking for
    #[serde(default)]
    pub services: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WishlistRecord {
    /// Create a pending record with no tags or services.
    pub fn new(id: RecordId, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            url: String::new(),
            maintainer: String::new(),
            approved: false,
            tags: BTreeSet::new(),
            services: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn approved(mut self, approved: bool) -> Self {
        self.approved = approved;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services = services.into_iter().map(Into::into).collect();
        self
    }
}

/// Full cache document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub total_count: usize,
    pub approved_count: usize,
    pub pending_count: usize,
    /// tag -> number of records carrying it
    #[serde(default)]
    pub derived_stats: BTreeMap<String, usize>,
    /// service -> number of records requesting it
    #[serde(default)]
    pub service_stats: BTreeMap<String, usize>,
    pub records: Vec<WishlistRecord>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::from_records(Vec::new())
    }
}

impl Snapshot {
    /// Build a snapshot from a freshly fetched record set.
    ///
    /// Records are ordered newest issue first and duplicate ids keep the last
    /// occurrence.
    pub fn from_records(records: Vec<WishlistRecord>) -> Self {
        let mut by_id: BTreeMap<RecordId, WishlistRecord> = BTreeMap::new();
        for record in records {
            by_id.insert(record.id, record);
        }

        let mut snapshot = Self {
            version: SNAPSHOT_VERSION,
            generated_at: DateTime::<Utc>::MIN_UTC,
            total_count: 0,
            approved_count: 0,
            pending_count: 0,
            derived_stats: BTreeMap::new(),
            service_stats: BTreeMap::new(),
            records: by_id.into_values().rev().collect(),
        };
        snapshot.recompute();
        snapshot
    }

    /// Rebuild every aggregate from `records` and restamp `generated_at`.
    ///
    /// The new stamp is always later than the previous one, so a snapshot
    /// derived from another sorts after it even if that one was stamped by a
    /// clock running ahead of ours.
    pub fn recompute(&mut self) {
        let mut derived_stats = BTreeMap::new();
        let mut service_stats = BTreeMap::new();
        let mut approved = 0;

        for record in &self.records {
            if record.approved {
                approved += 1;
            }
            for tag in &record.tags {
                *derived_stats.entry(tag.clone()).or_insert(0) += 1;
            }
            for service in &record.services {
                *service_stats.entry(service.clone()).or_insert(0) += 1;
            }
        }

        self.total_count = self.records.len();
        self.approved_count = approved;
        self.pending_count = self.total_count - approved;
        self.derived_stats = derived_stats;
        self.service_stats = service_stats;
        self.generated_at = Utc::now().max(self.generated_at + chrono::Duration::milliseconds(1));
    }

    /// Age relative to `now`; negative ages (clock skew) count as zero.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.generated_at).max(chrono::Duration::zero())
    }

    /// Look up a record by identity key.
    pub fn get(&self, id: RecordId) -> Option<&WishlistRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.get(id).is_some()
    }

    /// Only the records approved for public listing.
    pub fn approved_records(&self) -> impl Iterator<Item = &WishlistRecord> {
        self.records.iter().filter(|r| r.approved)
    }

    /// Check the aggregate invariants against the record list.
    pub fn is_consistent(&self) -> bool {
        let mut expected = self.clone();
        expected.recompute();
        self.total_count == self.records.len()
            && self.approved_count + self.pending_count == self.total_count
            && self.approved_count == expected.approved_count
            && self.derived_stats == expected.derived_stats
            && self.service_stats == expected.service_stats
    }
}
