//! Lambder snapshot replication
//!
//! Copies snapshots tagged for replication from the source region to the
//! destination region. One invocation is one run; scheduling is left to
//! cron, EventBridge or similar.

use anyhow::{Context, Result};
use clap::Parser;
use lambder_replicate::{
    ConfigError, LogFormat, LoggingConfig, Replicator, ReplicatorConfig, SnapshotStore, logging,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

const EXIT_CONFIG: u8 = 1;
const EXIT_RUN_FAILED: u8 = 2;

#[derive(Parser)]
#[command(name = "lambder-replicate")]
#[command(about = "Replicate tagged EBS snapshots to a disaster-recovery region", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (JSON or YAML); defaults to ./config.json when present
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the source region
    #[arg(long)]
    source_region: Option<String>,

    /// Override the destination region
    #[arg(long)]
    dest_region: Option<String>,

    /// Check for replicas without copying anything
    #[arg(long)]
    dry_run: bool,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn load_config(&self) -> Result<ReplicatorConfig, ConfigError> {
        let mut config = ReplicatorConfig::load(self.config.as_deref())?
            .with_env_overrides(|key| std::env::var(key).ok());

        if let Some(region) = &self.source_region {
            config.source_region = region.clone();
        }
        if let Some(region) = &self.dest_region {
            config.dest_region = region.clone();
        }
        if self.dry_run {
            config.dry_run = true;
        }

        config.validate()?;
        Ok(config)
    }

    fn logging_config(&self, base: &LoggingConfig) -> LoggingConfig {
        let mut logging = base.clone();
        if self.verbose {
            logging.level = "debug".to_string();
        }
        if let Some(format) = self.log_format {
            logging.format = format;
        }
        logging
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = cli.load_config();
    let base_logging = config
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    if let Err(e) = logging::init(&cli.logging_config(&base_logging)) {
        eprintln!("{:#}", e);
    }

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match run(config, cli.json).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_RUN_FAILED)
        }
    }
}

async fn run(config: ReplicatorConfig, json: bool) -> Result<()> {
    info!(
        "Starting snapshot replication {} -> {} (v{})",
        config.source_region,
        config.dest_region,
        env!("CARGO_PKG_VERSION")
    );
    if config.dry_run {
        info!("Running in DRY-RUN mode (no snapshots will be copied)");
    }

    let (source, destination) = connect(&config).await?;
    let replicator = Replicator::new(config, source, destination);

    let report = replicator.run().await.context("Replication run aborted")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

#[cfg(feature = "aws")]
async fn connect(
    config: &ReplicatorConfig,
) -> Result<(Arc<dyn SnapshotStore>, Arc<dyn SnapshotStore>)> {
    use lambder_replicate::Ec2Store;

    let source = Ec2Store::connect(&config.source_region).await;
    let destination = Ec2Store::connect(&config.dest_region).await;
    Ok((Arc::new(source), Arc::new(destination)))
}

#[cfg(not(feature = "aws"))]
async fn connect(
    _config: &ReplicatorConfig,
) -> Result<(Arc<dyn SnapshotStore>, Arc<dyn SnapshotStore>)> {
    anyhow::bail!("No snapshot provider available: build with the 'aws' feature")
}
