//! Coordinator binary

use clap::{Parser, Subcommand};
use ringdht::common::{Config, UdpTransport};
use ringdht::coordinator::{load_items, Coordinator, Item};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ringdht-coord")]
#[command(about = "ringdht coordinator: membership, ring order and item placement")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the coordinator and its operator prompt
    Serve {
        /// Config file (defaults to ./ringdht.toml if present)
        #[arg(long)]
        config: Option<String>,

        /// UDP bind address
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Dataset to distribute (CSV, or JSON Lines for .jsonl)
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Dataset field used as the item key
        #[arg(long)]
        key_field: Option<String>,

        /// Log level (trace, debug, info, warn, error)
        #[arg(long)]
        log_level: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            bind,
            dataset,
            key_field,
            log_level,
        } => {
            // Load config from file, then override with CLI arguments
            let config = match config {
                Some(path) => Config::load_from(&path)?,
                None => Config::load()?,
            };
            let log_level = log_level.unwrap_or(config.log_level);
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| log_level.into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            let mut coord_config = config.coordinator;
            if let Some(bind) = bind {
                coord_config.bind_addr = bind;
            }
            if dataset.is_some() {
                coord_config.dataset = dataset;
            }
            if let Some(key_field) = key_field {
                coord_config.key_field = key_field;
            }

            let items = match &coord_config.dataset {
                Some(path) => match load_items(path, &coord_config.key_field).await {
                    Ok(items) => items,
                    Err(e) => {
                        tracing::warn!("Could not load dataset {}: {}", path.display(), e);
                        Vec::new()
                    }
                },
                None => Vec::new(),
            };

            let coordinator = Arc::new(Coordinator::bind(&coord_config).await?);
            let server = tokio::spawn(coordinator.clone().serve());

            operate(&coordinator, &items).await?;
            server.await??;
        }
    }

    Ok(())
}

/// Operator prompt: setup, distribute, status, teardown
async fn operate(coordinator: &Coordinator<UdpTransport>, items: &[Item]) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Coordinator commands: setup, distribute, status, teardown");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received");
                None
            }
        };

        let Some(line) = line else {
            // stdin closed or interrupted: shut the ring down.
            coordinator.teardown().await?;
            return Ok(());
        };

        match line.trim() {
            "" => {}
            "setup" => {
                let report = coordinator.rebuild_and_broadcast().await?;
                println!("Ring updated: {} sent, {} failed", report.sent, report.failed);
            }
            "distribute" => match coordinator.distribute(items).await {
                Ok(report) => println!(
                    "Distributed: {} placed, {} failed",
                    report.placed, report.failed
                ),
                Err(e) => println!("Cannot distribute: {}", e),
            },
            "status" => {
                let ring = coordinator.registry().snapshot().await?;
                println!("{} peers, {} items loaded", ring.len(), items.len());
                for (peer, next) in ring.successors() {
                    println!(
                        "  peer {} at {} -> {}",
                        peer.id,
                        peer.socket_addr(),
                        next.socket_addr()
                    );
                }
            }
            "teardown" => {
                let report = coordinator.teardown().await?;
                println!(
                    "Teardown sent to {} peers ({} failed)",
                    report.sent, report.failed
                );
                return Ok(());
            }
            other => println!(
                "Unknown command {:?}. Available: setup, distribute, status, teardown",
                other
            ),
        }
    }
}
