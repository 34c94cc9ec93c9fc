mod network;
mod reconcile;
mod scenario;

use clap::Parser;
use log::info;
use scenario::Scenario;
use shared::{LogSink, DEFAULT_HOST, DEFAULT_PORT};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host to connect to
    #[arg(long = "server_host", default_value = DEFAULT_HOST)]
    server_host: String,

    /// Server UDP port
    #[arg(long = "server_port", default_value_t = DEFAULT_PORT)]
    server_port: u16,

    /// Player identifier (1-255)
    #[arg(long = "player_id")]
    player_id: u8,

    /// Claim behavior to run headlessly
    #[arg(long, value_enum, default_value = "idle")]
    scenario: Scenario,

    /// Smoothing factor for the latency/jitter estimate (0-1]
    #[arg(long, default_value_t = 0.2)]
    smoothing: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let server_addr = format!("{}:{}", args.server_host, args.server_port);

    let mut client = network::Client::new(
        &server_addr,
        args.player_id,
        args.scenario,
        args.smoothing,
        Arc::new(LogSink),
    )
    .await?;

    tokio::select! {
        result = client.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
    }

    Ok(())
}
