// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Malcolm detector simulator
//!
//! Hosts a simulated detector for exercising clients without hardware.
//!
//! # Usage
//!
//! ```bash
//! # Serve "det" on the default port (5600)
//! malcolm-sim
//!
//! # Custom name and port
//! malcolm-sim --name det2 --port 5610
//!
//! # From a config file
//! malcolm-sim --config sim.json
//! ```

use clap::Parser;
use malcolm::server::{Server, ServerConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod config;
mod dummy_det;

use config::SimConfig;
use dummy_det::dummy_det;

/// Malcolm detector simulator - a dummy detector over the Malcolm protocol
#[derive(Parser, Debug)]
#[command(name = "malcolm-sim")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Device name
    #[arg(short, long, default_value = "det")]
    name: String,

    /// TCP port to listen on
    #[arg(short, long, default_value = "5600")]
    port: u16,

    /// Bind address (0.0.0.0 for all interfaces)
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Load or create config
    let config = if let Some(config_path) = args.config {
        info!("Loading config from {:?}", config_path);
        SimConfig::from_file(&config_path)?
    } else {
        SimConfig {
            name: args.name,
            server: ServerConfig {
                endpoint: format!("tcp://{}:{}", args.bind, args.port),
                ..Default::default()
            },
        }
    };
    config.validate()?;

    info!("+----------------------------------------------------+");
    info!(
        "|       Malcolm Simulator v{}                     |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Device:   {:38} |", config.name);
    info!("|  Endpoint: {:38} |", config.server.endpoint);
    info!(
        "|  Grace:    {:38} |",
        format!("{}ms", config.server.shutdown_grace_ms)
    );
    info!("+----------------------------------------------------+");

    let device = dummy_det(&config.name)?;
    let server = Server::bind(device, config.server).await?;
    if let Some(addr) = server.local_addr() {
        info!("Listening on {}", addr);
    }

    // Handle shutdown signals
    let handle = server.handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received, stopping server...");
        handle.stop();
    });

    server.serve().await?;

    info!("Simulator stopped");
    Ok(())
}
