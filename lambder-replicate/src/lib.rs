//! # Lambder snapshot replication
//!
//! Copies tagged volume snapshots from a source region to a destination
//! region, keeping exactly one replica per source snapshot across repeated
//! runs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lambder_replicate::{MemoryStore, Replicator, ReplicatorConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ReplicatorConfig::new("us-east-1", "us-west-2");
//!     let source = Arc::new(MemoryStore::new("us-east-1"));
//!     let destination = Arc::new(MemoryStore::new("us-west-2"));
//!
//!     let replicator = Replicator::new(config, source, destination);
//!     let report = replicator.run().await?;
//!     println!("Copied {} snapshots", report.copied);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod replicator;
pub mod snapshot;
pub mod store;

pub use config::{LogFormat, LoggingConfig, MissingGroupPolicy, ReplicatorConfig, TagConfig};
pub use error::{ConfigError, ReplicationError, Result, StoreError};
pub use replicator::{ReplicationOutcome, Replicator, RunReport};
pub use snapshot::{Fingerprint, Snapshot, Tags};
#[cfg(feature = "aws")]
pub use store::Ec2Store;
pub use store::{MemoryStore, SnapshotFilter, SnapshotStore};
