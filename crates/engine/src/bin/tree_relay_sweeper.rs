//! Tree Relay response sweeper
//!
//! Keeps a response store directory within its TTL: removes expired offloaded responses and
//! orphaned partial writes, either once (`--once`) or periodically until Ctrl-C.
//!
//! Configuration is read from the same `TREE_RELAY_*` variables as the engine; flags override.

use anyhow::{Context, Result};
use clap::Parser;
use relay_engine::EngineConfig;
use relay_response_store::ResponseStore;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

#[derive(Parser)]
#[command(name = "tree-relay-sweeper")]
#[command(about = "Expire offloaded Tree Relay responses", long_about = None)]
#[command(version)]
struct Cli {
    /// Store directory (overrides TREE_RELAY_STORE_DIR)
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Seconds between sweeps (overrides TREE_RELAY_SWEEP_INTERVAL_SECS)
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Run one sweep, print the report as JSON and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .init();

    let mut config = EngineConfig::from_env();
    if let Some(dir) = cli.store_dir {
        config = config.with_store_dir(dir);
    }
    if let Some(secs) = cli.interval_secs {
        config.sweep_interval = Duration::from_secs(secs.max(1));
    }

    let store = ResponseStore::open(config.store.clone())
        .await
        .with_context(|| format!("open response store {}", config.store.dir.display()))?;

    if cli.once {
        let report = store.sweep(SystemTime::now()).await.context("sweep")?;
        println!(
            "{}",
            serde_json::json!({
                "dir": store.dir().display().to_string(),
                "scanned": report.scanned,
                "removed": report.removed,
                "skipped_in_use": report.skipped_in_use,
                "bytes_freed": report.bytes_freed,
            })
        );
        return Ok(());
    }

    log::info!(
        "sweeping {} every {:?} (ttl {:?})",
        store.dir().display(),
        config.sweep_interval,
        config.store.ttl
    );
    let sweeper = store.spawn_sweeper(config.sweep_interval);

    tokio::signal::ctrl_c()
        .await
        .context("wait for shutdown signal")?;

    log::info!("shutting down sweeper");
    store.close();
    sweeper.join().await;
    Ok(())
}
