mod game;
mod network;
mod session;

use clap::Parser;
use log::info;
use network::{Server, ServerConfig};
use shared::{LogSink, DEFAULT_HOST, DEFAULT_MAX_SESSIONS, DEFAULT_PORT, DEFAULT_RATE_HZ};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host address to bind the UDP socket to
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// UDP port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Snapshot broadcast rate in Hz
    #[arg(long, default_value_t = DEFAULT_RATE_HZ)]
    rate: u32,

    /// Maximum number of concurrent client sessions
    #[arg(long, default_value_t = DEFAULT_MAX_SESSIONS)]
    max_clients: usize,

    /// Seconds of silence before a session is evicted
    #[arg(long, default_value_t = shared::DEFAULT_SESSION_TIMEOUT_SECS)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        rate_hz: args.rate,
        max_sessions: args.max_clients,
        session_timeout: Duration::from_secs(args.timeout_secs),
    };

    let mut server = Server::new(config, Arc::new(LogSink)).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
    }

    Ok(())
}
