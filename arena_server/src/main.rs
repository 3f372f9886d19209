//! Standalone relay binary.
//!
//! Usage:
//!   cargo run -p arena_server -- [--config server.json] [--addr 127.0.0.1:40000]
//!       [--max-players 64]
//!
//! The relay accepts client connections, assigns player ids and forwards
//! each client's state to every other client.

use std::env;

use anyhow::Context;
use arena_server::RelayServer;
use arena_shared::config::ServerConfig;
use tracing::info;

fn parse_args() -> anyhow::Result<ServerConfig> {
    let args: Vec<String> = env::args().collect();
    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => ServerConfig::from_file(&args[i + 1])?,
        _ => ServerConfig::default(),
    };
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => i += 2,
            "--addr" if i + 1 < args.len() => {
                cfg.listen_addr = args[i + 1].clone();
                i += 2;
            }
            "--max-players" if i + 1 < args.len() => {
                cfg.max_players = args[i + 1].parse().context("parse --max-players")?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(addr = %cfg.listen_addr, max_players = cfg.max_players, "Starting relay");

    let server = RelayServer::bind(cfg).await.context("bind relay")?;
    let local = server.local_addr()?;
    info!(%local, "Relay listening");

    server.run().await
}
