//! Command-line front end for the Strata memory engine.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use std::path::PathBuf;
use strata::MemoryRuntime;
use strata::config::StrataConfig;
use strata::memory::CancellationToken;

/// Command-line options for the memory CLI.
#[derive(Parser)]
#[command(name = "strata", version)]
struct Cli {
    /// Optional path to a strata.json5 config file
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a memory in every configured tier
    Store {
        key: String,
        content: String,
        /// Expire the memory after this many seconds
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
    /// Search all tiers for memories similar to a query
    Search {
        query: String,
        /// Maximum number of results (defaults to manager.default_limit)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Remove expired memories from every tier
    Cleanup,
    /// Print durable tier statistics
    Stats,
    /// Run an evolution cycle if one is due
    Evolve {
        /// Run even if the interval has not elapsed
        #[arg(long)]
        force: bool,
    },
    /// Print recent evolution cycles
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    strata::init_logging();
    let cli = Cli::parse();
    info!("starting strata (config_set={})", cli.config.is_some());

    let config = if let Some(path) = cli.config.as_ref() {
        StrataConfig::load_from_path(path).context("failed to load config")?
    } else {
        let cwd = std::env::current_dir().context("failed to read current dir")?;
        let layered = StrataConfig::load_layered(&cwd).context("failed to load layered config")?;
        debug!("layered config loaded (layers={})", layered.layers.len());
        layered.config
    };

    let runtime = MemoryRuntime::from_config(&config)
        .await
        .context("failed to open memory tiers")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling in-flight operations");
            on_interrupt.cancel();
        }
    });

    run(cli.command, &runtime, &cancel).await
}

async fn run(
    command: Command,
    runtime: &MemoryRuntime,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    match command {
        Command::Store {
            key,
            content,
            ttl_secs,
        } => {
            let stored = match ttl_secs {
                Some(secs) => {
                    let ttl = i64::try_from(secs)
                        .ok()
                        .and_then(chrono::Duration::try_seconds)
                        .context("ttl is out of range")?;
                    runtime
                        .manager
                        .store_memory_with_ttl(&key, &content, ttl, cancel)
                        .await
                }
                None => runtime.manager.store_memory(&key, &content, cancel).await,
            };
            if !stored {
                bail!("failed to store memory {key}");
            }
            println!("stored {key}");
        }
        Command::Search { query, limit } => {
            let limit = limit.unwrap_or(runtime.default_limit);
            let hits = runtime.manager.search_similar(&query, limit, cancel).await;
            if hits.is_empty() {
                println!("no matching memories");
            }
            for hit in hits {
                println!(
                    "{:.4}\t{}\t{}\t{}",
                    hit.similarity, hit.tier, hit.record.key, hit.record.content
                );
            }
        }
        Command::Cleanup => {
            let summary = runtime.manager.cleanup(cancel).await;
            for (tier, removed) in &summary.removed {
                println!("{tier}: removed {removed}");
            }
            if !summary.failed_tiers.is_empty() {
                bail!("cleanup failed for: {}", summary.failed_tiers.join(", "));
            }
        }
        Command::Stats => {
            let stats = runtime
                .durable
                .get_stats(cancel)
                .await
                .context("failed to read stats")?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Evolve { force } => {
            let due = runtime
                .evolution
                .should_evolve(cancel)
                .await
                .context("failed to read evolution history")?;
            if !due && !force {
                println!("evolution not due yet");
                return Ok(());
            }
            let report = runtime
                .evolution
                .evolve(cancel)
                .await
                .context("evolution cycle failed")?;
            println!(
                "cycle {} at {}: {} summaries, {} improvements, {} expired removed",
                report.record_id,
                report.timestamp.to_rfc3339(),
                report.summaries.len(),
                report.improvements.len(),
                report.removed
            );
            for improvement in &report.improvements {
                println!("  - {improvement}");
            }
        }
        Command::History { limit } => {
            let records = runtime
                .evolution
                .log()
                .history(limit, cancel)
                .await
                .context("failed to read evolution history")?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }
    Ok(())
}
