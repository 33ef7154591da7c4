// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! malcolmctl: command-line Malcolm client
//!
//! ```bash
//! malcolmctl --device det get status
//! malcolmctl --device det call configure nframes=5 exposure=0.1
//! malcolmctl --device det subscribe status --count 10
//! ```

use clap::{Parser, Subcommand};
use malcolm::client::{Client, ClientConfig};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Command-line client for Malcolm devices
#[derive(Parser, Debug)]
#[command(name = "malcolmctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server endpoint
    #[arg(short, long, default_value = "tcp://127.0.0.1:5600")]
    endpoint: String,

    /// Device name
    #[arg(short, long, default_value = "det")]
    device: String,

    /// Per-reply timeout in milliseconds (0 = wait forever)
    #[arg(long, default_value = "0")]
    timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read the device, its status, its attributes or one attribute
    Get { path: String },
    /// Call a method; arguments are key=value, values parsed as JSON when possible
    Call {
        method: String,
        args: Vec<String>,
    },
    /// Print values of a subscription until ctrl-c or --count values
    Subscribe {
        path: String,
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
}

/// Parse `key=value` pairs into call arguments.
fn parse_args(pairs: &[String]) -> Result<Map<String, Value>, String> {
    let mut args = Map::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            return Err(format!("Expected key=value, got {}", pair));
        };
        if key.is_empty() {
            return Err(format!("Empty argument name in {}", pair));
        }
        let value =
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        args.insert(key.to_string(), value);
    }
    Ok(args)
}

fn print(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn subscribe(
    client: &Client,
    path: &str,
    count: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = client
        .subscribe(path, move |value| {
            let _ = tx.send(value);
        })
        .await?;

    let mut seen = 0;
    loop {
        tokio::select! {
            value = rx.recv() => {
                let Some(value) = value else { break };
                print(&value)?;
                seen += 1;
                if count.is_some_and(|n| seen >= n) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    debug!("Unsubscribing after {} values", seen);
    subscription.unsubscribe().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ClientConfig {
        request_timeout_ms: cli.timeout_ms,
        ..Default::default()
    };
    let client = Client::connect(&cli.endpoint, &cli.device, config).await?;

    match cli.command {
        Command::Get { path } => print(&client.get(&path).await?)?,
        Command::Call { method, args } => {
            let args = parse_args(&args)?;
            if let Some(value) = client.call(&method, args).await? {
                print(&value)?;
            }
        }
        Command::Subscribe { path, count } => subscribe(&client, &path, count).await?,
    }

    client.close();
    Ok(())
}
