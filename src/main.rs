mod logging;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use index_replicator::{PgSource, ReplicationConfig, ReplicationEngine};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "index-replicator",
    version,
    about = "Incrementally replicate PostgreSQL rows into an Elasticsearch index"
)]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Drain the backlog once and exit
    #[arg(long)]
    once: bool,

    /// Validate the config (including query and index definition files) and exit
    #[arg(long, conflicts_with = "once")]
    check: bool,

    /// Drain once from the stored watermark into an in-memory index; neither
    /// Elasticsearch nor the state file is written
    #[arg(long, conflicts_with_all = ["once", "check"])]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    let config = ReplicationConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    if cli.dry_run {
        return dry_run(&config).await;
    }

    let mut engine = ReplicationEngine::from_config(&config).context("building engine")?;

    if cli.check {
        info!(config = %cli.config.display(), "Configuration is valid");
        return Ok(());
    }

    if cli.once {
        let summary = engine.run_once().await?;
        info!(
            batches = summary.batches,
            documents = summary.documents,
            watermark = ?summary.watermark.map(|w| w.to_canonical_string()),
            "Single pass complete"
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, stopping after the current cycle"),
            Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C, stopping"),
        }
        let _ = shutdown_tx.send(true);
    });

    engine.run(shutdown_rx).await?;
    Ok(())
}

async fn dry_run(config: &ReplicationConfig) -> anyhow::Result<()> {
    let source = PgSource::from_config(config).context("building source")?;
    let mut engine = ReplicationEngine::dry_run(config, source).context("building engine")?;

    let summary = engine.run_once().await?;
    let indexed = engine.sink().document_count(&config.destination.index).await;
    info!(
        batches = summary.batches,
        documents = summary.documents,
        indexed,
        watermark = ?summary.watermark.map(|w| w.to_canonical_string()),
        "Dry run complete, nothing written"
    );
    Ok(())
}
