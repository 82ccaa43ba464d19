//! Snapshot store - the remote resource-provider boundary
//!
//! A [`SnapshotStore`] is one region of a snapshot provider. The replicator
//! only needs four calls from it:
//! - list snapshots carrying a tag key
//! - list snapshots with an exact description
//! - copy a snapshot in from another region
//! - tag a snapshot
//!
//! [`MemoryStore`] simulates a region in memory; [`Ec2Store`] (feature `aws`)
//! talks to Amazon EC2.

use async_trait::async_trait;
use std::fmt;

use crate::error::StoreError;
use crate::snapshot::{Snapshot, Tags};

#[cfg(feature = "aws")]
pub mod ec2;
pub mod memory;

#[cfg(feature = "aws")]
pub use ec2::Ec2Store;
pub use memory::MemoryStore;

/// Snapshot listing filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotFilter {
    /// Snapshots carrying this tag key, whatever its value
    TagKey(String),
    /// Snapshots whose description equals this text exactly
    Description(String),
}

impl SnapshotFilter {
    pub fn matches(&self, snapshot: &Snapshot) -> bool {
        match self {
            Self::TagKey(key) => snapshot.tags.contains_key(key),
            Self::Description(text) => snapshot.description.as_deref() == Some(text.as_str()),
        }
    }
}

impl fmt::Display for SnapshotFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TagKey(key) => write!(f, "tag-key={}", key),
            Self::Description(text) => write!(f, "description={}", text),
        }
    }
}

/// One region of a snapshot provider
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Region this store operates in
    fn region(&self) -> &str;

    /// List every snapshot matching the filter
    async fn list_snapshots(&self, filter: &SnapshotFilter) -> Result<Vec<Snapshot>, StoreError>;

    /// Copy a snapshot from `source_region` into this region
    ///
    /// Returns the id of the new snapshot.
    async fn copy_snapshot(
        &self,
        source_region: &str,
        source_snapshot_id: &str,
        description: &str,
    ) -> Result<String, StoreError>;

    /// Add tags to a snapshot in this region
    async fn create_tags(&self, snapshot_id: &str, tags: &Tags) -> Result<(), StoreError>;
}
