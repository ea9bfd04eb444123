//! dprd-ipc - IPC client for the p2p-dprd ranging daemon
//!
//! Subscribes to candidate-node updates over the daemon's Unix datagram
//! control socket and drives position/range changes from the command line.

mod config;
mod network;
mod protocol;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use network::{ClientEvent, IpcConfig, SubscriptionClient};
use protocol::Command;

/// dprd-ipc - Drive and observe a p2p-dprd ranging daemon
#[derive(Parser)]
#[command(name = "dprd-ipc")]
#[command(author = "dprd-ipc Contributors")]
#[command(version = "0.1.0")]
#[command(about = "IPC client for the p2p-dprd ranging daemon", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the daemon's control socket
    #[arg(short, long, global = true)]
    daemon: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe to candidate-node updates and print each snapshot
    Watch {
        /// Receive socket to bind (overrides configuration)
        #[arg(short, long)]
        socket: Option<PathBuf>,
    },

    /// Send a one-shot position update
    SetPosition {
        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },

    /// Send a one-shot coordination range update
    SetRange {
        /// Coordination range in metres
        #[arg(short, long)]
        range: u16,
    },

    /// Remove a subscriber socket from the daemon's list
    Unsubscribe {
        /// Subscriber socket path to remove
        #[arg(short, long)]
        socket: PathBuf,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    let mut ipc_config = config.ipc_config();
    if let Some(daemon) = &cli.daemon {
        ipc_config.daemon_socket = daemon.clone();
    }

    match cli.command {
        Commands::Watch { socket } => {
            if let Some(socket) = socket {
                ipc_config.receive_socket = socket;
            }
            run_watch(ipc_config).await?;
        }
        Commands::SetPosition { lat, lon } => {
            network::send_oneshot(&ipc_config.daemon_socket, &Command::set_position(lat, lon))
                .await?;
            println!("Position set to ({}, {})", lat, lon);
        }
        Commands::SetRange { range } => {
            network::send_oneshot(
                &ipc_config.daemon_socket,
                &Command::set_coordination_range(range),
            )
            .await?;
            println!("Coordination range set to {}", range);
        }
        Commands::Unsubscribe { socket } => {
            let path = socket
                .to_str()
                .context("subscriber socket path is not valid UTF-8")?;
            network::send_oneshot(&ipc_config.daemon_socket, &Command::unsubscribe(path)).await?;
            println!("Unsubscribed {}", socket.display());
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config();
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

/// Subscribe and print candidate-node snapshots until interrupted
async fn run_watch(ipc_config: IpcConfig) -> anyhow::Result<()> {
    tracing::info!(
        "Watching daemon at {} from {}",
        ipc_config.daemon_socket.display(),
        ipc_config.receive_socket.display()
    );

    let mut client = SubscriptionClient::new(ipc_config);
    let mut event_rx = client.take_event_receiver().unwrap();

    client.start().await?;

    println!("Subscribed to candidate-node updates. Press Ctrl+C to stop.\n");

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                match event {
                    ClientEvent::SnapshotUpdated { collection } => {
                        println!(
                            "Snapshot: {} nodes (version {}, payload type {})",
                            collection.nodes.len(),
                            collection.version_id,
                            collection.payload_type
                        );
                        for node in &collection.nodes {
                            println!(
                                "  #{:<10} ({:.5}, {:.5})  range {:>5}m  {}:{}  radac {}:{}  t={}",
                                node.node_id,
                                node.lat,
                                node.lon,
                                node.coord_range,
                                node.ip,
                                node.port,
                                node.radac_ip,
                                node.radac_port,
                                node.timestamp
                            );
                        }
                    }
                    ClientEvent::DecodeFailed { message } => {
                        tracing::warn!("Undecodable update: {}", message);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nUnsubscribing...");
                break;
            }
        }
    }

    if let Err(e) = client.unsubscribe().await {
        tracing::warn!("Unsubscribe failed: {}", e);
    }
    client.shutdown().await;
    tracing::info!("Client stopped");

    Ok(())
}
