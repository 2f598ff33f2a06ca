//! Node binary

use clap::{Parser, Subcommand};
use ringdht::common::{Config, UdpTransport};
use ringdht::node::{LookupOutcome, Node};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ringdht-node")]
#[command(about = "ringdht node: holds a partition and forwards lookups around the ring")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register with the coordinator and start serving
    Serve {
        /// Config file (defaults to ./ringdht.toml if present)
        #[arg(long)]
        config: Option<String>,

        /// UDP port to listen on (shortcut for --bind 127.0.0.1:<port>)
        #[arg(short, long)]
        port: Option<u16>,

        /// UDP bind address
        #[arg(long, conflicts_with = "port")]
        bind: Option<SocketAddr>,

        /// Coordinator address
        #[arg(short, long)]
        coordinator: Option<SocketAddr>,

        /// How long to wait for an id, in milliseconds
        #[arg(long)]
        register_timeout_ms: Option<u64>,

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
            port,
            bind,
            coordinator,
            register_timeout_ms,
            log_level,
        } => {
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

            let mut node_config = config.node;
            if let Some(port) = port {
                node_config.bind_addr.set_port(port);
            }
            if let Some(bind) = bind {
                node_config.bind_addr = bind;
            }
            if let Some(coordinator) = coordinator {
                node_config.coordinator_addr = coordinator;
            }
            if let Some(timeout) = register_timeout_ms {
                node_config.register_timeout_ms = timeout;
            }

            let node = Arc::new(Node::bind(&node_config).await?);
            tracing::info!("Node started on {}", node.local_addr()?);
            let peer_id = node.register().await?;
            println!("Registered with coordinator, id {}", peer_id);

            let mut answers = node.subscribe();
            tokio::spawn(async move {
                while let Ok(answer) = answers.recv().await {
                    println!("Found event {}: {:?}", answer.event_id, answer.event_data);
                }
            });

            let server = tokio::spawn(node.clone().serve());
            operate(&node, server).await?;
            println!("Node {} exiting", peer_id);
        }
    }

    Ok(())
}

/// Operator prompt: query <event_id>, status, leave, exit
async fn operate(
    node: &Node<UdpTransport>,
    mut server: tokio::task::JoinHandle<ringdht::Result<()>>,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Node commands: query <event_id>, status, leave, exit");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            finished = &mut server => {
                // Listener ended on its own: teardown from the coordinator.
                finished??;
                return Ok(());
            }
            _ = tokio::signal::ctrl_c() => None,
        };

        let Some(line) = line else {
            return Ok(());
        };

        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (None, _, _) => {}
            (Some("query"), Some(event_id), None) => match node.query(event_id).await {
                Ok(LookupOutcome::Dropped) => println!("Event {} not found", event_id),
                Ok(_) => {}
                Err(e) => println!("Query failed: {}", e),
            },
            (Some("query"), _, _) => println!("Usage: query <event_id>"),
            (Some("status"), None, _) => {
                let status = node.status();
                println!(
                    "id {:?}, {}, next peer {}, {} items",
                    status.peer_id,
                    status.state,
                    status
                        .successor
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "unset".into()),
                    status.items
                );
            }
            (Some("leave"), None, _) => {
                if let Err(e) = node.leave().await {
                    println!("Leave failed: {}", e);
                }
                return Ok(());
            }
            (Some("exit"), None, _) => return Ok(()),
            _ => println!("Unknown command. Available: query <event_id>, status, leave, exit"),
        }
    }
}
