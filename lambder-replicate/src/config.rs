use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

/// Config file read when no path is given on the command line
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Environment variables overriding the configured regions
pub const ENV_SOURCE_REGION: &str = "AWS_SOURCE_REGION";
pub const ENV_DEST_REGION: &str = "AWS_DEST_REGION";

/// Replicator configuration
///
/// JSON files may use the legacy `AWS_SOURCE_REGION` / `AWS_DEST_REGION`
/// keys; they are accepted as aliases of `source_region` / `dest_region`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicatorConfig {
    /// Region holding the snapshots to replicate
    #[serde(alias = "AWS_SOURCE_REGION")]
    pub source_region: String,

    /// Region receiving the copies
    #[serde(alias = "AWS_DEST_REGION")]
    pub dest_region: String,

    pub tags: TagConfig,

    /// What to do with a candidate that has no backup group tag
    pub missing_group: MissingGroupPolicy,

    /// Check for replicas but never copy or tag
    pub dry_run: bool,

    pub logging: LoggingConfig,
}

/// Tag keys used to select and label snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    /// Presence on a source snapshot marks it for replication
    pub replicate_tag: String,
    /// Names the backup job that produced a snapshot
    pub backup_tag: String,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            replicate_tag: "LambderReplicate".to_string(),
            backup_tag: "LambderBackup".to_string(),
        }
    }
}

/// Handling of candidates without a backup group tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingGroupPolicy {
    /// Leave the snapshot alone and log a warning
    #[default]
    Skip,
    /// Replicate with an empty group segment (`us-east-1_snap-1_`)
    EmptySegment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl ReplicatorConfig {
    pub fn new(source_region: impl Into<String>, dest_region: impl Into<String>) -> Self {
        Self {
            source_region: source_region.into(),
            dest_region: dest_region.into(),
            ..Default::default()
        }
    }

    /// Load configuration from a JSON or YAML file, chosen by extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );

        let parsed = if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        };

        parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Load the explicitly given file, or the default file when present.
    ///
    /// An explicit path must exist. Without one, a missing default file
    /// yields an empty configuration that the environment or command line
    /// may still complete.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.is_file() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Apply region overrides from the environment
    ///
    /// `lookup` is `std::env::var` in the binary.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(region) = lookup(ENV_SOURCE_REGION).filter(|r| !r.is_empty()) {
            self.source_region = region;
        }
        if let Some(region) = lookup(ENV_DEST_REGION).filter(|r| !r.is_empty()) {
            self.dest_region = region;
        }
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_region.trim().is_empty() {
            return Err(ConfigError::MissingRegion("source_region"));
        }
        if self.dest_region.trim().is_empty() {
            return Err(ConfigError::MissingRegion("dest_region"));
        }
        if self.source_region == self.dest_region {
            return Err(ConfigError::Invalid(format!(
                "source and destination region are both {}",
                self.source_region
            )));
        }
        if self.tags.replicate_tag.is_empty() || self.tags.backup_tag.is_empty() {
            return Err(ConfigError::Invalid("tag keys must not be empty".to_string()));
        }
        if self.tags.replicate_tag == self.tags.backup_tag {
            return Err(ConfigError::Invalid(format!(
                "replicate_tag and backup_tag are both {}",
                self.tags.replicate_tag
            )));
        }
        Ok(())
    }
}
