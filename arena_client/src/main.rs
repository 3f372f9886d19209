//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p arena_client -- [--config client.json] [--addr 127.0.0.1:40000]
//!       [--assets-dir assets] [--policy client_predicted] [--seconds 30] [--wander]
//!
//! Without a display the client renders to a null surface. `--wander` drives
//! the local player with scripted input so other clients have something to watch.

use std::env;
use std::time::Duration;

use anyhow::Context;
use arena_client::{
    input::{IdleInput, InputSource, WanderInput},
    GameClient,
};
use arena_shared::{config::ClientConfig, math::Vec2};
use tracing::info;

struct Args {
    cfg: ClientConfig,
    seconds: Option<u64>,
    wander: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = env::args().collect();

    // The config file is read first so flags can override it.
    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => ClientConfig::from_file(&args[i + 1])?,
        _ => ClientConfig::default(),
    };
    let mut seconds = None;
    let mut wander = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => i += 2,
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--assets-dir" if i + 1 < args.len() => {
                cfg.assets_dir = Some(args[i + 1].clone());
                i += 2;
            }
            "--policy" if i + 1 < args.len() => {
                let tag = serde_json::Value::String(args[i + 1].clone());
                cfg.movement_policy = serde_json::from_value(tag)
                    .with_context(|| format!("unknown movement policy {:?}", args[i + 1]))?;
                i += 2;
            }
            "--seconds" if i + 1 < args.len() => {
                seconds = Some(args[i + 1].parse().context("parse --seconds")?);
                i += 2;
            }
            "--wander" => {
                wander = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    Ok(Args { cfg, seconds, wander })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let Args { cfg, seconds, wander } = parse_args()?;
    info!(
        server = %cfg.server_addr,
        policy = ?cfg.movement_policy,
        assets_dir = ?cfg.assets_dir,
        "Starting client"
    );

    let screen_center = Vec2::new(cfg.viewport_width / 2.0, cfg.viewport_height / 2.0);
    let input: Box<dyn InputSource> = if wander {
        Box::new(WanderInput::new(90, screen_center))
    } else {
        Box::new(IdleInput)
    };

    let mut client = GameClient::load(cfg).await?.with_input(input);
    client.run(seconds.map(Duration::from_secs)).await?;

    info!(
        frames = client.frames(),
        latency_ms = ?client.sync().latency_ms(),
        remotes = client.context().remotes.len(),
        "Client stopped"
    );
    Ok(())
}
