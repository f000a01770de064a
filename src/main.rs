use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use vex_collector::config::{CollectorConfig, LogFormat};
use vex_collector::crawl::Orchestrator;
use vex_collector::events::TracingSink;
use vex_collector::hub::Hub;

#[derive(Parser)]
#[command(name = "vex-collector")]
#[command(version, about = "Collects VEX documents from package source repositories")]
struct Cli {
    /// Collector configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured log format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    /// Writes logs to a daily rolling file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl every package of a hub and update its mirror
    Crawl {
        /// Hub configuration file (JSON)
        #[arg(long)]
        hub: PathBuf,

        /// Overrides the mirror root declared in the hub
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = CollectorConfig::load(cli.config.as_deref())?;
    if let Some(format) = cli.log_format {
        config.log.format = format;
    }
    if let Some(file) = cli.log_file {
        config.log.file = Some(file);
    }
    let _guard = vex_collector::logging::init(&config.log)?;

    match cli.command {
        Command::Crawl { hub, root } => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(crawl(config, hub, root)),
    }
}

async fn crawl(
    config: CollectorConfig,
    hub_path: PathBuf,
    root: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut hub = Hub::load(&hub_path)?;
    if let Some(root) = root {
        hub.root = root;
    }

    let client = config
        .http_client()
        .context("failed to build HTTP client")?;
    let orchestrator = Orchestrator::from_config(&config, client, Arc::new(TracingSink));

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let report = orchestrator.crawl_all(&hub, &cancel).await?;
    tracing::info!(
        crawled = report.crawled.len(),
        skipped = report.skipped.len(),
        "Crawl pass completed"
    );
    Ok(())
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            tracing::warn!("Interrupted, cancelling crawl pass");
            cancel.cancel();
        }
        Err(e) => tracing::error!("Failed to install Ctrl+C handler: {}", e),
    }
}
