//! Site pair binary
//!
//! Runs both lending sites in one process, cross-wired for replication,
//! with a failover monitor per site. Optionally drives a request file
//! through site 1's dispatcher as a demo workload.

use anyhow::Result;
use clap::Parser;
use minilend::common::Config;
use minilend::site::{start_monitors, start_pair};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "minilend-site")]
#[command(about = "minilend two-site lending system with replication and failover")]
struct Cli {
    /// Directory for the per-site SQLite files
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Catalog items seeded at first start
    #[arg(long)]
    catalog_size: Option<usize>,

    /// Health probe interval in milliseconds
    #[arg(long)]
    probe_interval_ms: Option<u64>,

    /// Request file to replay through site 1 (one `<kind>,<borrower>,<item>` per line)
    #[arg(long)]
    requests: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // File/env config first, CLI flags take priority
    let mut config = Config::load();
    config.storage.data_dir = cli.data_dir;
    if let Some(n) = cli.catalog_size {
        config.storage.catalog_size = n;
    }
    if let Some(ms) = cli.probe_interval_ms {
        config.monitor.probe_interval_ms = ms;
    }

    tracing::info!("Starting minilend {}", minilend::VERSION);
    tracing::info!("  Data dir: {}", config.storage.data_dir.display());
    tracing::info!("  Catalog size: {}", config.storage.catalog_size);
    tracing::info!("  Probe interval: {:?}", config.monitor.probe_interval());

    let (site1, site2) = start_pair(&config)?;

    let (notify, mut failover_rx) = broadcast::channel(16);
    let _monitors = start_monitors(&config, &site1, &site2, notify);
    tokio::spawn(async move {
        while let Ok(event) = failover_rx.recv().await {
            tracing::error!("FAILOVER: traffic redirected to {}", event.new_endpoint);
        }
    });

    if let Some(path) = cli.requests {
        let contents = tokio::fs::read_to_string(&path).await?;
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            match site1.dispatch.submit(line).await {
                Ok(resp) if resp.success => tracing::info!("{} -> {}", line, resp.message),
                Ok(resp) => tracing::warn!("{} -> {}", line, resp.message),
                Err(e) => tracing::error!("{} -> {}", line, e),
            }
        }
        tracing::info!("Request file drained");
    }

    tracing::info!("✓ Both sites ready, Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    site1.shutdown();
    site2.shutdown();
    tracing::info!("Stopped");
    Ok(())
}
