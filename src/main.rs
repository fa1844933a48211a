//! CLI for rabbitpub
//!
//! Subcommands:
//! - `serve`: keep a publisher connected until Ctrl-C (useful for watching
//!   reconnect behaviour)
//! - `publish`: send a single JSON event and exit

use clap::{Parser, Subcommand};
use rabbitpub::utils::logging;
use rabbitpub::{ConnectionConfig, EventPublisher, load_config};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "rabbitpub", version)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to the broker and stay connected until Ctrl-C
    Serve,
    /// Publish one event
    Publish {
        /// Routing key, e.g. orders.created
        routing_key: String,
        /// Event payload as JSON, e.g. '{"id": 42}'
        data: String,
        /// Seconds to wait for the broker connection before publishing
        #[arg(long, default_value_t = 10)]
        wait_secs: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is normal.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let config = load_config().unwrap_or_else(|e| {
        error!(error = %e, "failed to load configuration, using defaults");
        ConnectionConfig::default()
    });

    match cli.command {
        Command::Serve => {
            run_server(config).await;
            ExitCode::SUCCESS
        }
        Command::Publish {
            routing_key,
            data,
            wait_secs,
        } => match run_publish(config, &routing_key, &data, wait_secs).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Publish failed: {}", e);
                ExitCode::FAILURE
            }
        },
    }
}

async fn run_server(config: ConnectionConfig) {
    let publisher = EventPublisher::start(config);

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("Shutdown signal received. Exiting gracefully.");
    publisher.shutdown().await;
}

async fn run_publish(
    config: ConnectionConfig,
    routing_key: &str,
    data: &str,
    wait_secs: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let payload: serde_json::Value = serde_json::from_str(data)?;
    let publisher = EventPublisher::start(config);

    if !publisher.wait_ready(Duration::from_secs(wait_secs)).await {
        warn!(wait_secs, "broker not ready yet, publishing anyway");
    }

    let result = publisher.publish(routing_key, &payload).await;
    publisher.shutdown().await;
    result?;

    info!(routing_key, "event published");
    Ok(())
}
