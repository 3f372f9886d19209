//! Network synchronization.
//!
//! [`NetSync`] tracks one connection's lifecycle and applies inbound messages
//! to the simulation context. It never touches sockets directly: outbound
//! frames go through a [`MessageChannel`], inbound frames are handed to
//! [`NetSync::handle_text`] by whoever owns the socket.
//!
//! Connection states:
//!
//! ```text
//! Connecting -> Open -> Closed -> Reconnecting -> Connecting -> ...
//! ```
//!
//! Sends are only attempted while `Open`; outside it they are skipped, not
//! queued. The next frame or ping interval sends fresh state anyway.

use arena_shared::{
    config::{BackoffConfig, MovementPolicy},
    math::Vec2,
    net::{decode_server_msg, encode_msg, ClientMsg, PlayerId, ServerMsg},
};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::{context::SimContext, input::build_input_msg};

/// Outbound half of a persistent message channel.
pub trait MessageChannel {
    fn is_open(&self) -> bool;
    fn send_text(&mut self, text: String) -> anyhow::Result<()>;
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connect attempt in flight.
    Connecting,
    /// Connected; the only state in which sends happen.
    Open,
    /// Connection lost, no retry scheduled yet.
    Closed,
    /// Waiting until `retry_at_ms` before connect attempt number `attempt`.
    Reconnecting { attempt: u32, retry_at_ms: i64 },
}

/// What an inbound frame did.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Assigned(PlayerId),
    Pong { latency_ms: i64 },
    /// The server reported our own position.
    LocalReport,
    RemoteJoined(PlayerId),
    RemoteMoved(PlayerId),
    RemoteLeft(PlayerId),
    /// Unknown type, or nothing to do.
    Ignored,
    /// Malformed frame, dropped.
    Dropped,
}

/// Exponential reconnect delay.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    cfg: BackoffConfig,
}

impl Backoff {
    pub fn new(cfg: BackoffConfig) -> Self {
        Self { cfg }
    }

    /// `base * 2^attempt`, capped at the configured maximum.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64 << attempt.min(32);
        self.cfg.base_ms.saturating_mul(factor).min(self.cfg.max_ms)
    }

    /// [`Backoff::delay_ms`] spread randomly by the configured jitter fraction.
    pub fn jittered_delay_ms<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> u64 {
        let delay = self.delay_ms(attempt);
        let jitter = f64::from(self.cfg.jitter.clamp(0.0, 1.0));
        if jitter == 0.0 || delay == 0 {
            return delay;
        }
        let spread = delay as f64 * jitter;
        (delay as f64 + rng.gen_range(-spread..=spread)).max(0.0) as u64
    }
}

/// Client side of the sync protocol.
#[derive(Debug)]
pub struct NetSync {
    state: ConnectionState,
    player_id: Option<PlayerId>,
    last_ping_sent_ms: Option<i64>,
    latency_ms: Option<i64>,
    backoff: Backoff,
    attempt: u32,
}

impl NetSync {
    pub fn new(backoff: BackoffConfig) -> Self {
        Self {
            state: ConnectionState::Connecting,
            player_id: None,
            last_ping_sent_ms: None,
            latency_ms: None,
            backoff: Backoff::new(backoff),
            attempt: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Our session id, once the server assigned one.
    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    /// Last measured round trip, in milliseconds.
    pub fn latency_ms(&self) -> Option<i64> {
        self.latency_ms
    }

    fn can_send(&self, chan: &dyn MessageChannel) -> bool {
        self.is_open() && chan.is_open()
    }

    fn send(&self, chan: &mut dyn MessageChannel, msg: &ClientMsg) -> bool {
        if !self.can_send(chan) {
            return false;
        }
        let sent = encode_msg(msg).and_then(|text| chan.send_text(text));
        match sent {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Send failed");
                false
            }
        }
    }

    /// A connect attempt started.
    pub fn begin_connect(&mut self) {
        debug!(attempt = self.attempt, "Connecting");
        self.state = ConnectionState::Connecting;
    }

    pub fn on_open(&mut self) {
        info!("Connection open");
        self.state = ConnectionState::Open;
        self.attempt = 0;
    }

    /// The connection dropped or a connect attempt failed. Session state
    /// (id, remote players, ping) belongs to the old connection and is reset.
    pub fn on_closed(&mut self, ctx: &mut SimContext) {
        if self.state == ConnectionState::Open {
            info!(player_id = ?self.player_id, "Connection closed");
        }
        self.state = ConnectionState::Closed;
        self.player_id = None;
        self.last_ping_sent_ms = None;
        self.latency_ms = None;
        ctx.clear_remotes();
    }

    /// Moves from `Closed` to `Reconnecting`. Returns when to retry.
    pub fn schedule_reconnect<R: Rng + ?Sized>(&mut self, now_ms: i64, rng: &mut R) -> i64 {
        let delay = self.backoff.jittered_delay_ms(self.attempt, rng);
        let retry_at_ms = now_ms + delay as i64;
        info!(attempt = self.attempt, delay_ms = delay, "Reconnect scheduled");
        self.state = ConnectionState::Reconnecting {
            attempt: self.attempt,
            retry_at_ms,
        };
        self.attempt = self.attempt.saturating_add(1);
        retry_at_ms
    }

    /// True once a scheduled reconnect is due.
    pub fn reconnect_due(&self, now_ms: i64) -> bool {
        matches!(
            self.state,
            ConnectionState::Reconnecting { retry_at_ms, .. } if now_ms >= retry_at_ms
        )
    }

    /// Sends a latency probe. Returns whether it went out.
    pub fn send_ping(&mut self, chan: &mut dyn MessageChannel, now_ms: i64) -> bool {
        let sent = self.send(chan, &ClientMsg::Ping);
        if sent {
            self.last_ping_sent_ms = Some(now_ms);
        }
        sent
    }

    /// Publishes the local player: raw input when the server owns movement,
    /// the predicted state otherwise.
    pub fn publish_local(&mut self, chan: &mut dyn MessageChannel, ctx: &SimContext) -> bool {
        let msg = match ctx.policy {
            MovementPolicy::ServerAuthoritative => build_input_msg(&ctx.input, ctx.local.angle),
            MovementPolicy::ClientPredicted => ClientMsg::PlayerUpdate {
                x: ctx.local.position.x,
                y: ctx.local.position.y,
                angle: ctx.local.angle,
            },
        };
        self.send(chan, &msg)
    }

    /// Decodes and applies one inbound frame. Malformed frames are logged and
    /// dropped; the connection stays up.
    pub fn handle_text(&mut self, text: &str, now_ms: i64, ctx: &mut SimContext) -> Inbound {
        match decode_server_msg(text) {
            Ok(Some(msg)) => self.handle_msg(msg, now_ms, ctx),
            Ok(None) => {
                debug!(frame = %text, "Ignoring unknown message type");
                Inbound::Ignored
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                Inbound::Dropped
            }
        }
    }

    pub fn handle_msg(&mut self, msg: ServerMsg, now_ms: i64, ctx: &mut SimContext) -> Inbound {
        match msg {
            ServerMsg::PlayerId { player_id } => {
                info!(%player_id, "Assigned player id");
                self.player_id = Some(player_id);
                // A move for us may have arrived before we knew our id.
                ctx.remove_remote(player_id);
                Inbound::Assigned(player_id)
            }
            ServerMsg::Pong => match self.last_ping_sent_ms {
                Some(sent) => {
                    let latency_ms = now_ms - sent;
                    self.latency_ms = Some(latency_ms);
                    Inbound::Pong { latency_ms }
                }
                None => Inbound::Ignored,
            },
            ServerMsg::PlayerMove {
                player_id,
                x,
                y,
                angle,
                velocity_x,
                velocity_y,
            } => {
                let position = Vec2::new(x, y);
                let velocity = Vec2::new(velocity_x, velocity_y);
                if self.player_id == Some(player_id) {
                    ctx.local.apply_server_state(position, angle, velocity);
                    Inbound::LocalReport
                } else if ctx.upsert_remote(player_id, position, angle, velocity) {
                    Inbound::RemoteJoined(player_id)
                } else {
                    Inbound::RemoteMoved(player_id)
                }
            }
            ServerMsg::PlayerLeft { player_id } => {
                if ctx.remove_remote(player_id) {
                    debug!(%player_id, "Remote player left");
                    Inbound::RemoteLeft(player_id)
                } else {
                    Inbound::Ignored
                }
            }
        }
    }
}

/// In-memory channel that records what was sent.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    pub open: bool,
    pub sent: Vec<String>,
}

impl MemoryChannel {
    pub fn open() -> Self {
        Self {
            open: true,
            sent: Vec::new(),
        }
    }
}

impl MessageChannel for MemoryChannel {
    fn is_open(&self) -> bool {
        self.open
    }

    fn send_text(&mut self, text: String) -> anyhow::Result<()> {
        self.sent.push(text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::{config::ClientConfig, resources::TextureTable};
    use rand::{rngs::StdRng, SeedableRng};

    fn setup() -> (NetSync, SimContext, MemoryChannel) {
        let mut sync = NetSync::new(BackoffConfig {
            jitter: 0.0,
            ..Default::default()
        });
        sync.on_open();
        let ctx = SimContext::new(&ClientConfig::default(), TextureTable::placeholders());
        (sync, ctx, MemoryChannel::open())
    }

    fn player_move(id: u64, x: f32, y: f32) -> String {
        format!(r#"{{"type":"playerMove","playerId":{id},"x":{x},"y":{y},"angle":0.5}}"#)
    }

    #[test]
    fn ping_pong_measures_latency() {
        let (mut sync, mut ctx, mut chan) = setup();
        assert!(sync.send_ping(&mut chan, 1000));
        assert_eq!(chan.sent, vec![r#"{"type":"ping"}"#.to_string()]);
        assert_eq!(
            sync.handle_text(r#"{"type":"pong"}"#, 1050, &mut ctx),
            Inbound::Pong { latency_ms: 50 }
        );
        assert_eq!(sync.latency_ms(), Some(50));
    }

    #[test]
    fn pong_without_ping_is_ignored() {
        let (mut sync, mut ctx, _chan) = setup();
        assert_eq!(sync.handle_text(r#"{"type":"pong"}"#, 10, &mut ctx), Inbound::Ignored);
        assert_eq!(sync.latency_ms(), None);
    }

    #[test]
    fn move_creates_remote_and_left_removes_it_once() {
        let (mut sync, mut ctx, _chan) = setup();
        assert_eq!(
            sync.handle_text(&player_move(42, 300.0, 400.0), 0, &mut ctx),
            Inbound::RemoteJoined(PlayerId(42))
        );
        assert_eq!(ctx.remotes.len(), 1);
        assert_eq!(ctx.remotes[&PlayerId(42)].position, Vec2::new(300.0, 400.0));

        assert_eq!(
            sync.handle_text(&player_move(42, 310.0, 400.0), 0, &mut ctx),
            Inbound::RemoteMoved(PlayerId(42))
        );
        assert_eq!(ctx.remotes.len(), 1);

        let left = r#"{"type":"playerLeft","playerId":42}"#;
        assert_eq!(sync.handle_text(left, 0, &mut ctx), Inbound::RemoteLeft(PlayerId(42)));
        assert!(ctx.remotes.is_empty());
        assert_eq!(sync.handle_text(left, 0, &mut ctx), Inbound::Ignored);
        assert!(ctx.remotes.is_empty());
    }

    #[test]
    fn own_moves_feed_the_local_player() {
        let (mut sync, mut ctx, _chan) = setup();
        sync.handle_text(r#"{"type":"PLAYER_ID","playerId":7}"#, 0, &mut ctx);
        assert_eq!(sync.player_id(), Some(PlayerId(7)));

        assert_eq!(
            sync.handle_text(&player_move(7, 900.0, 100.0), 0, &mut ctx),
            Inbound::LocalReport
        );
        assert!(ctx.remotes.is_empty());
        match &ctx.local.kind {
            crate::entity::EntityKind::Local(local) => {
                assert_eq!(local.server_target, Vec2::new(900.0, 100.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn id_assignment_drops_a_premature_self_entry() {
        let (mut sync, mut ctx, _chan) = setup();
        sync.handle_text(&player_move(7, 1.0, 1.0), 0, &mut ctx);
        assert_eq!(ctx.remotes.len(), 1);
        sync.handle_text(r#"{"type":"PLAYER_ID","playerId":7}"#, 0, &mut ctx);
        assert!(ctx.remotes.is_empty());
    }

    #[test]
    fn bad_frames_are_dropped_or_ignored() {
        let (mut sync, mut ctx, _chan) = setup();
        assert_eq!(sync.handle_text("not json", 0, &mut ctx), Inbound::Dropped);
        assert_eq!(
            sync.handle_text(r#"{"type":"playerMove","playerId":1}"#, 0, &mut ctx),
            Inbound::Dropped
        );
        assert_eq!(sync.handle_text(r#"{"type":"weather"}"#, 0, &mut ctx), Inbound::Ignored);
        assert!(sync.is_open());
        assert!(ctx.remotes.is_empty());
    }

    #[test]
    fn missing_velocity_defaults_to_zero() {
        let (mut sync, mut ctx, _chan) = setup();
        sync.handle_text(&player_move(3, 10.0, 10.0), 0, &mut ctx);
        assert_eq!(ctx.remotes[&PlayerId(3)].velocity(), Vec2::ZERO);
        sync.handle_text(
            r#"{"type":"playerMove","playerId":3,"x":10,"y":10,"angle":0,"velocityX":2,"velocityY":-1}"#,
            0,
            &mut ctx,
        );
        assert_eq!(ctx.remotes[&PlayerId(3)].velocity(), Vec2::new(2.0, -1.0));
    }

    #[test]
    fn nothing_is_sent_unless_open() {
        let (mut sync, ctx, mut chan) = setup();
        chan.open = false;
        assert!(!sync.send_ping(&mut chan, 0));
        assert!(!sync.publish_local(&mut chan, &ctx));

        chan.open = true;
        sync.begin_connect();
        assert!(!sync.send_ping(&mut chan, 0));
        assert!(chan.sent.is_empty());
    }

    #[test]
    fn publish_follows_movement_policy() {
        let (mut sync, mut ctx, mut chan) = setup();
        ctx.local.position = Vec2::new(12.0, 34.0);
        ctx.local.angle = 0.5;
        assert!(sync.publish_local(&mut chan, &ctx));
        assert_eq!(chan.sent[0], r#"{"type":"playerUpdate","x":12.0,"y":34.0,"angle":0.5}"#);

        ctx.policy = MovementPolicy::ServerAuthoritative;
        ctx.input.key_down("KeyW");
        assert!(sync.publish_local(&mut chan, &ctx));
        let value: serde_json::Value = serde_json::from_str(&chan.sent[1]).unwrap();
        assert_eq!(value["type"], "playerInput");
        assert_eq!(value["input"]["up"], true);
        assert_eq!(value["angle"], 0.5);
    }

    #[test]
    fn close_resets_session_and_backs_off() {
        let (mut sync, mut ctx, _chan) = setup();
        let mut rng = StdRng::seed_from_u64(1);
        sync.handle_text(r#"{"type":"PLAYER_ID","playerId":5}"#, 0, &mut ctx);
        sync.handle_text(&player_move(9, 0.0, 0.0), 0, &mut ctx);

        sync.on_closed(&mut ctx);
        assert_eq!(sync.state(), ConnectionState::Closed);
        assert_eq!(sync.player_id(), None);
        assert!(ctx.remotes.is_empty());

        assert_eq!(sync.schedule_reconnect(10_000, &mut rng), 10_500);
        assert!(!sync.reconnect_due(10_499));
        assert!(sync.reconnect_due(10_500));

        sync.begin_connect();
        sync.on_closed(&mut ctx);
        assert_eq!(sync.schedule_reconnect(20_000, &mut rng), 21_000);
        assert_eq!(
            sync.state(),
            ConnectionState::Reconnecting {
                attempt: 1,
                retry_at_ms: 21_000
            }
        );

        sync.on_open();
        sync.on_closed(&mut ctx);
        assert_eq!(sync.schedule_reconnect(0, &mut rng), 500);
    }

    #[test]
    fn backoff_is_capped_and_jitter_stays_in_range() {
        let backoff = Backoff::new(BackoffConfig {
            base_ms: 500,
            max_ms: 10_000,
            jitter: 0.2,
        });
        assert_eq!(backoff.delay_ms(0), 500);
        assert_eq!(backoff.delay_ms(3), 4000);
        assert_eq!(backoff.delay_ms(5), 10_000);
        assert_eq!(backoff.delay_ms(200), 10_000);

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let d = backoff.jittered_delay_ms(2, &mut rng);
            assert!((1600..=2400).contains(&d), "{d}");
        }
    }
}
