//! In-memory snapshot store
//!
//! Simulates one region: snapshots, copies and tags live in a vector behind
//! a lock. Every call is counted and failures can be injected, so tests can
//! assert exactly which remote calls a run made.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::{SnapshotFilter, SnapshotStore};
use crate::error::StoreError;
use crate::snapshot::{Snapshot, Tags};

/// A copy request as received by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    pub source_region: String,
    pub source_snapshot_id: String,
    pub description: String,
}

/// Number of calls made per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list_by_tag: usize,
    pub list_by_description: usize,
    pub copy: usize,
    pub create_tags: usize,
}

/// Simulated snapshot region
pub struct MemoryStore {
    region: String,
    snapshots: RwLock<Vec<Snapshot>>,
    copies: RwLock<Vec<CopyRequest>>,
    described: RwLock<Vec<String>>,
    counts: RwLock<CallCounts>,
    /// Fail the copy call with this 1-based index
    fail_copy_at: Option<usize>,
    fail_listing: bool,
}

impl MemoryStore {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            snapshots: RwLock::new(Vec::new()),
            copies: RwLock::new(Vec::new()),
            described: RwLock::new(Vec::new()),
            counts: RwLock::new(CallCounts::default()),
            fail_copy_at: None,
            fail_listing: false,
        }
    }

    /// Fail the `n`-th copy call (1-based) with a throttling error
    pub fn fail_copy_at(mut self, n: usize) -> Self {
        self.fail_copy_at = Some(n);
        self
    }

    /// Fail every listing call
    pub fn fail_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    /// Add a snapshot to this region, stamping it with the region name
    pub fn insert(&self, mut snapshot: Snapshot) {
        snapshot.region = self.region.clone();
        self.snapshots.write().push(snapshot);
    }

    pub fn with_snapshot(self, snapshot: Snapshot) -> Self {
        self.insert(snapshot);
        self
    }

    /// All snapshots currently in the region
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots.read().clone()
    }

    pub fn get(&self, snapshot_id: &str) -> Option<Snapshot> {
        self.snapshots
            .read()
            .iter()
            .find(|s| s.id == snapshot_id)
            .cloned()
    }

    /// Snapshots whose description equals `description`
    pub fn find_by_description(&self, description: &str) -> Vec<Snapshot> {
        self.snapshots
            .read()
            .iter()
            .filter(|s| s.description.as_deref() == Some(description))
            .cloned()
            .collect()
    }

    /// Copy requests that succeeded, in order
    pub fn copies(&self) -> Vec<CopyRequest> {
        self.copies.read().clone()
    }

    /// Descriptions looked up with a description filter, in order
    pub fn description_lookups(&self) -> Vec<String> {
        self.described.read().clone()
    }

    pub fn counts(&self) -> CallCounts {
        *self.counts.read()
    }

    fn new_snapshot_id() -> String {
        format!("snap-{}", &uuid::Uuid::new_v4().simple().to_string()[..17])
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    fn region(&self) -> &str {
        &self.region
    }

    async fn list_snapshots(&self, filter: &SnapshotFilter) -> Result<Vec<Snapshot>, StoreError> {
        {
            let mut counts = self.counts.write();
            match filter {
                SnapshotFilter::TagKey(_) => counts.list_by_tag += 1,
                SnapshotFilter::Description(text) => {
                    counts.list_by_description += 1;
                    self.described.write().push(text.clone());
                }
            }
        }

        if self.fail_listing {
            return Err(StoreError::remote(
                "DescribeSnapshots",
                &self.region,
                "UnauthorizedOperation",
            ));
        }

        let matched: Vec<Snapshot> = self
            .snapshots
            .read()
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();

        debug!(region = %self.region, %filter, matched = matched.len(), "Listed snapshots");
        Ok(matched)
    }

    async fn copy_snapshot(
        &self,
        source_region: &str,
        source_snapshot_id: &str,
        description: &str,
    ) -> Result<String, StoreError> {
        let call = {
            let mut counts = self.counts.write();
            counts.copy += 1;
            counts.copy
        };

        if self.fail_copy_at == Some(call) {
            return Err(StoreError::remote(
                "CopySnapshot",
                &self.region,
                "RequestLimitExceeded: request limit exceeded",
            ));
        }

        let id = Self::new_snapshot_id();
        self.snapshots
            .write()
            .push(Snapshot::new(id.clone(), self.region.clone()).with_description(description));
        self.copies.write().push(CopyRequest {
            source_region: source_region.to_string(),
            source_snapshot_id: source_snapshot_id.to_string(),
            description: description.to_string(),
        });

        debug!(region = %self.region, source_snapshot_id, new_snapshot_id = %id, "Copied snapshot");
        Ok(id)
    }

    async fn create_tags(&self, snapshot_id: &str, tags: &Tags) -> Result<(), StoreError> {
        self.counts.write().create_tags += 1;

        let mut snapshots = self.snapshots.write();
        let snapshot = snapshots
            .iter_mut()
            .find(|s| s.id == snapshot_id)
            .ok_or_else(|| {
                StoreError::remote(
                    "CreateTags",
                    &self.region,
                    format!("InvalidSnapshot.NotFound: {}", snapshot_id),
                )
            })?;

        for (key, value) in tags.iter() {
            snapshot.tags.insert(key, value);
        }
        Ok(())
    }
}
