use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use minicoap::config::{ServerConfig, DEFAULT_PORT};
use minicoap::dispatcher::UdpServer;
use minicoap::store::MemoryStore;

/// CoAP-like datagram server backed by an in-memory record store.
#[derive(Parser)]
struct Args {
    /// UDP port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// append log output to this file instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match &args.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt().init();
        }
    }

    let config = ServerConfig::new(SocketAddr::from(([0, 0, 0, 0], args.port)));
    let server = UdpServer::bind(config, Arc::new(MemoryStore::new())).await?;
    server.recv_loop().await
}
