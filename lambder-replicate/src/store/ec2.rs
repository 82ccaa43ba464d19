//! Amazon EC2 snapshot store
//!
//! Maps the store operations onto EC2:
//! - listing: `DescribeSnapshots` with a `tag-key` or `description` filter,
//!   restricted to snapshots owned by the caller and paginated to the end
//! - copy: `CopySnapshot`, issued in the destination region
//! - tagging: `CreateTags`
//!
//! Credentials come from the default AWS provider chain.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ec2::config::Region;
use aws_sdk_ec2::error::DisplayErrorContext;
use aws_sdk_ec2::types::{Filter, Tag};
use tracing::{debug, info};

use super::{SnapshotFilter, SnapshotStore};
use crate::error::StoreError;
use crate::snapshot::{Snapshot, Tags};

/// EC2 snapshots of one region
#[derive(Clone)]
pub struct Ec2Store {
    region: String,
    client: aws_sdk_ec2::Client,
}

impl Ec2Store {
    /// Build a client for `region` from the default AWS configuration
    pub async fn connect(region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        info!("EC2 client initialized for region {}", region);
        Self::from_client(region, aws_sdk_ec2::Client::new(&config))
    }

    /// Wrap an existing client
    pub fn from_client(region: &str, client: aws_sdk_ec2::Client) -> Self {
        Self {
            region: region.to_string(),
            client,
        }
    }

    fn to_filter(filter: &SnapshotFilter) -> Filter {
        match filter {
            SnapshotFilter::TagKey(key) => Filter::builder().name("tag-key").values(key).build(),
            SnapshotFilter::Description(text) => {
                Filter::builder().name("description").values(text).build()
            }
        }
    }

    fn to_snapshot(&self, snapshot: &aws_sdk_ec2::types::Snapshot) -> Result<Snapshot, StoreError> {
        let id = snapshot.snapshot_id().ok_or(StoreError::MissingField {
            operation: "DescribeSnapshots",
            field: "SnapshotId",
        })?;

        let tags: Tags = snapshot
            .tags()
            .iter()
            .filter_map(|tag| tag.key().map(|key| (key, tag.value().unwrap_or_default())))
            .collect();

        Ok(Snapshot {
            id: id.to_string(),
            region: self.region.clone(),
            description: snapshot.description().map(str::to_string),
            tags,
        })
    }
}

#[async_trait]
impl SnapshotStore for Ec2Store {
    fn region(&self) -> &str {
        &self.region
    }

    async fn list_snapshots(&self, filter: &SnapshotFilter) -> Result<Vec<Snapshot>, StoreError> {
        let mut pages = self
            .client
            .describe_snapshots()
            .owner_ids("self")
            .filters(Self::to_filter(filter))
            .into_paginator()
            .items()
            .send();

        let mut snapshots = Vec::new();
        while let Some(item) = pages.next().await {
            let snapshot = item.map_err(|e| {
                StoreError::remote(
                    "DescribeSnapshots",
                    &self.region,
                    DisplayErrorContext(&e).to_string(),
                )
            })?;
            snapshots.push(self.to_snapshot(&snapshot)?);
        }

        debug!(region = %self.region, %filter, matched = snapshots.len(), "Listed EC2 snapshots");
        Ok(snapshots)
    }

    async fn copy_snapshot(
        &self,
        source_region: &str,
        source_snapshot_id: &str,
        description: &str,
    ) -> Result<String, StoreError> {
        let output = self
            .client
            .copy_snapshot()
            .source_region(source_region)
            .source_snapshot_id(source_snapshot_id)
            .description(description)
            .send()
            .await
            .map_err(|e| {
                StoreError::remote(
                    "CopySnapshot",
                    &self.region,
                    DisplayErrorContext(&e).to_string(),
                )
            })?;

        output
            .snapshot_id()
            .map(str::to_string)
            .ok_or(StoreError::MissingField {
                operation: "CopySnapshot",
                field: "SnapshotId",
            })
    }

    async fn create_tags(&self, snapshot_id: &str, tags: &Tags) -> Result<(), StoreError> {
        let ec2_tags: Vec<Tag> = tags
            .iter()
            .map(|(key, value)| Tag::builder().key(key).value(value).build())
            .collect();

        self.client
            .create_tags()
            .resources(snapshot_id)
            .set_tags(Some(ec2_tags))
            .send()
            .await
            .map_err(|e| {
                StoreError::remote(
                    "CreateTags",
                    &self.region,
                    DisplayErrorContext(&e).to_string(),
                )
            })?;

        Ok(())
    }
}
