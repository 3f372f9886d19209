//! Client implementation.
//!
//! The client maintains:
//! - A persistent framed socket to the relay, reconnected with backoff
//! - The simulation context (world, camera, local and remote players)
//! - A frame timer driving the scheduler at the display rate
//! - A ping timer measuring round-trip latency
//!
//! Everything runs on one task. Frames, pings and socket events are
//! multiplexed with `select!`, so inbound messages are always applied
//! between frames, never during one.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use arena_shared::{
    config::ClientConfig,
    render::NullSurface,
    resources::{load_textures, FsImageLoader, ImageLoader, PlaceholderLoader, TextureTable},
};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    context::SimContext,
    frame::{FrameReport, FrameScheduler},
    input::{IdleInput, InputSource},
    session::{ConnectionState, MemoryChannel, MessageChannel, NetSync},
    transport::{ChannelEvent, SocketChannel},
};

/// Wall-clock milliseconds, used for ping and reconnect timing.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// High-level game client.
pub struct GameClient {
    cfg: ClientConfig,
    server_addr: SocketAddr,
    ctx: SimContext,
    sync: NetSync,
    channel: Option<SocketChannel>,
    scheduler: FrameScheduler,
    surface: NullSurface,
    input_source: Box<dyn InputSource>,
    epoch: Instant,
}

impl GameClient {
    /// Builds a client around already loaded textures.
    pub fn new(cfg: ClientConfig, textures: TextureTable) -> anyhow::Result<Self> {
        let server_addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let ctx = SimContext::new(&cfg, textures);
        let sync = NetSync::new(cfg.reconnect);
        Ok(Self {
            cfg,
            server_addr,
            ctx,
            sync,
            channel: None,
            scheduler: FrameScheduler::new(),
            surface: NullSurface,
            input_source: Box::new(IdleInput),
            epoch: Instant::now(),
        })
    }

    /// Loads every sprite, then builds the client. Nothing runs before all
    /// sprites are ready.
    pub async fn load(cfg: ClientConfig) -> anyhow::Result<Self> {
        let loader: Arc<dyn ImageLoader> = match &cfg.assets_dir {
            Some(dir) => Arc::new(FsImageLoader::new(dir)),
            None => Arc::new(PlaceholderLoader),
        };
        let textures = load_textures(loader).await.context("load textures")?;
        Self::new(cfg, textures)
    }

    pub fn with_input(mut self, source: Box<dyn InputSource>) -> Self {
        self.input_source = source;
        self
    }

    pub fn context(&self) -> &SimContext {
        &self.ctx
    }

    pub fn sync(&self) -> &NetSync {
        &self.sync
    }

    pub fn frames(&self) -> u64 {
        self.scheduler.frames()
    }

    fn connect(&mut self) {
        info!(server = %self.server_addr, "Connecting to server");
        self.sync.begin_connect();
        self.channel = Some(SocketChannel::connect(self.server_addr));
    }

    /// Runs until `limit` elapses, or forever when `None`.
    pub async fn run(&mut self, limit: Option<Duration>) -> anyhow::Result<()> {
        let frame_period = Duration::from_secs_f64(1.0 / f64::from(self.cfg.frame_hz.max(1)));
        let mut frame_timer = time::interval(frame_period);
        frame_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let ping_period = Duration::from_millis(self.cfg.ping_interval_ms.max(1));
        let mut ping_timer = time::interval(ping_period);
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = limit.map(|d| Instant::now() + d);

        if self.channel.is_none() && self.sync.state() == ConnectionState::Connecting {
            self.connect();
        }

        loop {
            tokio::select! {
                _ = frame_timer.tick() => {
                    self.frame();
                }
                _ = ping_timer.tick() => {
                    self.ping();
                }
                event = next_event(&mut self.channel) => {
                    self.on_channel_event(event);
                }
                _ = until(deadline) => {
                    break;
                }
            }
        }
        Ok(())
    }

    fn frame(&mut self) -> FrameReport {
        if self.sync.reconnect_due(now_ms()) {
            self.connect();
        }

        let frame = self.scheduler.frames();
        self.input_source.poll(frame, &mut self.ctx.input);

        let timestamp = self.epoch.elapsed().as_secs_f64() * 1000.0;
        let mut closed = MemoryChannel::default();
        let chan: &mut dyn MessageChannel = match self.channel.as_mut() {
            Some(chan) => chan,
            None => &mut closed,
        };
        self.scheduler.run_frame(
            timestamp,
            &mut self.ctx,
            &mut self.sync,
            chan,
            &mut self.surface,
        )
    }

    fn ping(&mut self) {
        if let Some(chan) = self.channel.as_mut() {
            self.sync.send_ping(chan, now_ms());
        }
        debug!(
            latency_ms = ?self.sync.latency_ms(),
            remotes = self.ctx.remotes.len(),
            "Ping"
        );
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Opened => {
                self.sync.on_open();
                self.ping();
            }
            ChannelEvent::Message(text) => {
                self.sync.handle_text(&text, now_ms(), &mut self.ctx);
            }
            ChannelEvent::Closed(reason) => {
                warn!(reason = %reason, "Connection closed");
                self.channel = None;
                self.sync.on_closed(&mut self.ctx);
                self.sync
                    .schedule_reconnect(now_ms(), &mut rand::thread_rng());
            }
        }
    }
}

async fn next_event(channel: &mut Option<SocketChannel>) -> ChannelEvent {
    match channel {
        Some(chan) => chan.next_event().await,
        None => std::future::pending().await,
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
