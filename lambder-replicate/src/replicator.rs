//! Cross-region snapshot replication
//!
//! One run is a stateless pass over the provider's resources:
//! 1. list source snapshots carrying the replicate tag
//! 2. for each, look in the destination for a snapshot whose description is
//!    the candidate's fingerprint
//! 3. if there is none, copy the snapshot with the fingerprint as its
//!    description and tag the copy
//!
//! The description/tag metadata on the replicas is the only state of record,
//! which makes repeated runs idempotent.
//!
//! The existence check and the copy are separate remote calls with nothing
//! held between them. Two runs racing on the same region pair can both see
//! "no replica" and both copy, leaving duplicates with the same fingerprint.
//! Later runs report such duplicates as a warning and leave them in place.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{MissingGroupPolicy, ReplicatorConfig};
use crate::error::{ReplicationError, Result, StoreError};
use crate::snapshot::{Fingerprint, Snapshot, Tags};
use crate::store::{SnapshotFilter, SnapshotStore};

/// What happened to one candidate snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReplicationOutcome {
    /// A new copy was created and tagged
    Copied {
        destination_id: String,
        fingerprint: Fingerprint,
    },
    /// The destination already holds `replicas` copies
    AlreadyReplicated {
        fingerprint: Fingerprint,
        replicas: usize,
    },
    /// Dry run: a copy would have been made
    WouldCopy { fingerprint: Fingerprint },
    /// Left alone, e.g. no backup group tag
    Skipped { reason: String },
}

/// Summary of a replication run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub source_region: String,
    pub dest_region: String,
    pub dry_run: bool,
    pub candidates: usize,
    pub copied: usize,
    pub already_replicated: usize,
    pub would_copy: usize,
    pub skipped: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    fn record(&mut self, outcome: &ReplicationOutcome) {
        match outcome {
            ReplicationOutcome::Copied { .. } => self.copied += 1,
            ReplicationOutcome::AlreadyReplicated { .. } => self.already_replicated += 1,
            ReplicationOutcome::WouldCopy { .. } => self.would_copy += 1,
            ReplicationOutcome::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Replicates tagged snapshots from a source region to a destination region
pub struct Replicator {
    config: ReplicatorConfig,
    source: Arc<dyn SnapshotStore>,
    destination: Arc<dyn SnapshotStore>,
}

impl Replicator {
    /// Create a replicator over two region stores
    ///
    /// The stores should operate in the configured source and destination
    /// regions; a mismatch is logged but not rejected.
    pub fn new(
        config: ReplicatorConfig,
        source: Arc<dyn SnapshotStore>,
        destination: Arc<dyn SnapshotStore>,
    ) -> Self {
        if source.region() != config.source_region {
            warn!(
                "Source store region {} differs from configured source region {}",
                source.region(),
                config.source_region
            );
        }
        if destination.region() != config.dest_region {
            warn!(
                "Destination store region {} differs from configured destination region {}",
                destination.region(),
                config.dest_region
            );
        }

        Self {
            config,
            source,
            destination,
        }
    }

    pub fn config(&self) -> &ReplicatorConfig {
        &self.config
    }

    /// List source snapshots carrying the replicate tag, whatever its value
    pub async fn discover_candidates(&self) -> std::result::Result<Vec<Snapshot>, StoreError> {
        let filter = SnapshotFilter::TagKey(self.config.tags.replicate_tag.clone());
        self.source.list_snapshots(&filter).await
    }

    /// Value of the backup group tag, if the snapshot has one
    pub fn resolve_backup_group<'a>(&self, snapshot: &'a Snapshot) -> Option<&'a str> {
        snapshot.tags.get(&self.config.tags.backup_tag)
    }

    /// Fingerprint of a source snapshot in the configured source region
    pub fn fingerprint(&self, snapshot_id: &str, backup_group: &str) -> Fingerprint {
        Fingerprint::new(&self.config.source_region, snapshot_id, backup_group)
    }

    /// Count destination snapshots described with the snapshot's fingerprint
    pub async fn find_existing_replica(
        &self,
        snapshot_id: &str,
        backup_group: &str,
    ) -> std::result::Result<usize, StoreError> {
        let fingerprint = self.fingerprint(snapshot_id, backup_group);
        let replicas = self
            .destination
            .list_snapshots(&SnapshotFilter::Description(fingerprint.into()))
            .await?;
        Ok(replicas.len())
    }

    /// Copy one source snapshot unless the destination already has it
    pub async fn copy_snapshot_if_missing(&self, snapshot: &Snapshot) -> Result<ReplicationOutcome> {
        self.replicate(snapshot)
            .await
            .map_err(|source| ReplicationError::Snapshot {
                snapshot_id: snapshot.id.clone(),
                source,
            })
    }

    async fn replicate(
        &self,
        snapshot: &Snapshot,
    ) -> std::result::Result<ReplicationOutcome, StoreError> {
        let backup_group = match self.resolve_backup_group(snapshot) {
            Some(group) => group,
            None => match self.config.missing_group {
                MissingGroupPolicy::Skip => {
                    warn!(
                        "Snapshot {} has no {} tag, skipping",
                        snapshot.id, self.config.tags.backup_tag
                    );
                    return Ok(ReplicationOutcome::Skipped {
                        reason: format!("missing {} tag", self.config.tags.backup_tag),
                    });
                }
                MissingGroupPolicy::EmptySegment => {
                    warn!(
                        "Snapshot {} has no {} tag, replicating with an empty group",
                        snapshot.id, self.config.tags.backup_tag
                    );
                    ""
                }
            },
        };

        info!("Looking for existing replicas of snapshot {}", snapshot.id);
        let fingerprint = self.fingerprint(&snapshot.id, backup_group);
        let replicas = self.find_existing_replica(&snapshot.id, backup_group).await?;

        if replicas > 0 {
            if replicas > 1 {
                warn!(
                    fingerprint = %fingerprint,
                    replicas,
                    "Multiple replicas found for snapshot {}",
                    snapshot.id
                );
            }
            info!("Replica found, no need to copy snapshot {}", snapshot.id);
            return Ok(ReplicationOutcome::AlreadyReplicated {
                fingerprint,
                replicas,
            });
        }

        if self.config.dry_run {
            info!(
                "No replica found, would copy snapshot {} (dry run)",
                snapshot.id
            );
            return Ok(ReplicationOutcome::WouldCopy { fingerprint });
        }

        info!("No replica found, copying snapshot {}", snapshot.id);
        let destination_id = self
            .destination
            .copy_snapshot(
                &self.config.source_region,
                &snapshot.id,
                fingerprint.as_str(),
            )
            .await?;

        let tags = Tags::new()
            .with(self.config.tags.replicate_tag.as_str(), fingerprint.as_str())
            .with(self.config.tags.backup_tag.as_str(), backup_group);
        self.destination.create_tags(&destination_id, &tags).await?;

        debug!(
            source_snapshot_id = %snapshot.id,
            destination_id = %destination_id,
            fingerprint = %fingerprint,
            "Replica created and tagged"
        );

        Ok(ReplicationOutcome::Copied {
            destination_id,
            fingerprint,
        })
    }

    /// Replicate every candidate, one at a time
    ///
    /// The first failure aborts the run; candidates already processed keep
    /// their copies.
    pub async fn run(&self) -> Result<RunReport> {
        let started_at = Utc::now();

        let candidates = self
            .discover_candidates()
            .await
            .map_err(ReplicationError::Discovery)?;
        info!("Found {} source snapshots", candidates.len());

        let mut report = RunReport {
            source_region: self.config.source_region.clone(),
            dest_region: self.config.dest_region.clone(),
            dry_run: self.config.dry_run,
            candidates: candidates.len(),
            copied: 0,
            already_replicated: 0,
            would_copy: 0,
            skipped: 0,
            started_at,
            finished_at: started_at,
        };

        for snapshot in &candidates {
            let outcome = self.copy_snapshot_if_missing(snapshot).await?;
            report.record(&outcome);
        }

        report.finished_at = Utc::now();
        info!(
            copied = report.copied,
            already_replicated = report.already_replicated,
            would_copy = report.would_copy,
            skipped = report.skipped,
            "Replication run complete"
        );

        Ok(report)
    }
}
