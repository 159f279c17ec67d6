use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;
use volarchd::cli::console;
use volarchd::config::{AppConfig, FailurePolicy};
use volarchd::core::transfer_engine::{self, TransferEngineType};
use volarchd::core::{LabelCollision, Orchestrator};
use volarchd::{adapters, context, logging};

#[derive(Parser)]
#[command(name = "volarchd")]
#[command(about = "Archives removable volumes as they are plugged in", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: $VOLARCHD_CONFIG or /etc/volarchd/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigOverrides,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll for new volumes and archive them until interrupted
    Watch,
    /// Print the removable volumes currently attached
    List {
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Serialize)]
struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    destination_root: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    max_capacity_bytes: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    label_collision: Option<LabelCollision>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    failure_policy: Option<FailurePolicy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    transfer_engine: Option<TransferEngineType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    simulation: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    json_logs: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::new(cli.config.as_deref(), Some(&cli.overrides))
        .context("Failed to load configuration")?;
    logging::init(logging::LogConfig::from(&config));

    match cli.command {
        Commands::Watch => run_watch(config).await.context("Volume watcher stopped")?,
        Commands::List { json } => run_list(&config, json)
            .await
            .context("Failed to list volumes")?,
        Commands::Config => print!("{}", toml::to_string_pretty(&config)?),
    }

    Ok(())
}

async fn run_watch(config: AppConfig) -> Result<()> {
    let ctx = context::AppContext::new(config);
    let enumerator = adapters::get_enumerator(ctx.config.simulation)?;
    let engine = transfer_engine::create_engine(&ctx.config);

    let (tx, rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(console::run(rx));

    let shutdown = ctx.shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        shutdown.cancel();
    });

    let result = Orchestrator::new(ctx, enumerator, engine, tx).start().await;

    // The orchestrator owned the last sender; let the reporter flush.
    let _ = reporter.await;
    Ok(result?)
}

async fn run_list(config: &AppConfig, json: bool) -> Result<()> {
    let enumerator = adapters::get_enumerator(config.simulation)?;
    let volumes = tokio::task::spawn_blocking(move || enumerator.list_volumes()).await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&volumes)?);
        return Ok(());
    }

    if volumes.is_empty() {
        println!("No removable volumes attached.");
    }
    for volume in &volumes {
        println!(
            "{:<24} {:<28} {:>10} {:>10} {:<8} {}",
            volume.device_id,
            volume.mount_path.display(),
            console::format_bytes(volume.capacity),
            console::format_bytes(volume.free),
            volume.filesystem,
            volume.label
        );
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
