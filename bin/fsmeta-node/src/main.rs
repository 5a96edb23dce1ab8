//! fsmeta node - Metadata partition daemon
//!
//! Opens one metadata partition, rebuilds its free list and runs the trash
//! GC until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use fsmeta_common::Config;
use fsmeta_store::{MetaPartition, TrashGc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "fsmeta-node")]
#[command(about = "fsmeta metadata partition node")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/fsmeta/node.toml")]
    config: PathBuf,

    /// Data directory
    #[arg(long, env = "FSMETA_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Partition to serve
    #[arg(long)]
    partition_id: Option<u64>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Do not run the background trash GC
    #[arg(long)]
    no_gc: bool,
}

fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let config_str = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&config_str).with_context(|| format!("parsing config file {}", path.display()))
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.to_string().into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // CLI takes precedence over the config file
    let mut config = load_config(&args.config)?;
    if let Some(data_dir) = args.data_dir {
        config.node.data_dir = data_dir;
    }
    if let Some(id) = args.partition_id {
        config.partition.id = id;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.no_gc {
        config.trash.enabled = false;
    }
    config.validate()?;

    init_tracing(&config.logging.level, args.log_json);

    info!("Starting fsmeta node {}", config.node.name);
    info!("Config file: {}", args.config.display());
    info!("Data directory: {}", config.node.data_dir.display());

    let partition = Arc::new(
        MetaPartition::open(&config)
            .with_context(|| format!("opening partition {}", config.partition.id))?,
    );
    let stats = partition.stats()?;
    info!(
        "Partition {}: {} live inodes, {} deleted inodes, {} deleted dentries",
        partition.id(),
        stats.inodes,
        stats.deleted_inodes,
        stats.deleted_dentries
    );

    let gc = TrashGc::new(Arc::clone(&partition), config.trash.clone());
    if config.trash.enabled {
        info!(
            "Trash GC every {}s, retention {}s",
            config.trash.interval_secs, config.trash.retention_secs
        );
        gc.start();
    } else {
        warn!("Trash GC disabled; expired inodes will not be reclaimed");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    gc.shutdown();

    Ok(())
}
