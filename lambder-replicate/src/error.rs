use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
///
/// Every variant is fatal at startup: nothing is replicated without a
/// complete, valid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Missing required setting: {0}")]
    MissingRegion(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors from the remote snapshot provider
#[derive(Debug, Error)]
pub enum StoreError {
    /// Auth, throttling, network, quota: anything the provider rejected
    #[error("{operation} failed in {region}: {message}")]
    Remote {
        operation: &'static str,
        region: String,
        message: String,
    },

    #[error("{operation} response is missing {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },
}

impl StoreError {
    pub fn remote(operation: &'static str, region: &str, message: impl Into<String>) -> Self {
        Self::Remote {
            operation,
            region: region.to_string(),
            message: message.into(),
        }
    }
}

/// Errors that abort a replication run
#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("Failed to list source snapshots: {0}")]
    Discovery(#[source] StoreError),

    #[error("Failed to replicate snapshot {snapshot_id}: {source}")]
    Snapshot {
        snapshot_id: String,
        #[source]
        source: StoreError,
    },
}

/// Result type alias for replication operations
pub type Result<T> = std::result::Result<T, ReplicationError>;
