//! Relay implementation.
//!
//! One task per peer. Each task owns its socket and selects between reading
//! frames and draining the peer's outbound queue. The shared [`Hub`] holds
//! every peer's queue and last reported state, so a broadcast is a series
//! of non-blocking sends under one lock.

use std::{
    collections::BTreeMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use arena_shared::{
    config::ServerConfig,
    net::{
        decode_client_msg, encode_msg, ClientMsg, FrameConn, FrameListener, FrameReader,
        FrameWriter, PlayerId, ServerMsg,
    },
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, Mutex},
};
use tracing::{debug, info, warn};

struct Peer {
    outbound: mpsc::UnboundedSender<String>,
    /// Last `playerMove` frame produced for this peer, replayed to newcomers.
    last_state: Option<String>,
}

#[derive(Default)]
struct Hub {
    peers: BTreeMap<PlayerId, Peer>,
}

/// A peer registered in the hub whose task has not started yet.
struct Admission {
    id: PlayerId,
    outbound: mpsc::UnboundedSender<String>,
    outbound_rx: mpsc::UnboundedReceiver<String>,
}

impl Hub {
    /// Registers a new peer, queueing its id and the last known state of every
    /// other peer. Returns `None` when the relay is full.
    fn admit(&mut self, max_players: usize) -> anyhow::Result<Option<Admission>> {
        if self.peers.len() >= max_players {
            return Ok(None);
        }
        let id = PlayerId::new_unique();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        outbound.send(encode_msg(&ServerMsg::PlayerId { player_id: id })?)?;
        for state in self.peers.values().filter_map(|p| p.last_state.as_ref()) {
            outbound.send(state.clone())?;
        }
        self.peers.insert(
            id,
            Peer {
                outbound: outbound.clone(),
                last_state: None,
            },
        );
        Ok(Some(Admission {
            id,
            outbound,
            outbound_rx,
        }))
    }

    fn broadcast_except(&self, from: PlayerId, frame: &str) {
        for (id, peer) in &self.peers {
            if *id != from {
                let _ = peer.outbound.send(frame.to_owned());
            }
        }
    }
}

/// Cloneable view of a running relay.
#[derive(Clone)]
pub struct RelayHandle {
    hub: Arc<Mutex<Hub>>,
}

impl RelayHandle {
    pub async fn peer_count(&self) -> usize {
        self.hub.lock().await.peers.len()
    }
}

/// Relay server.
pub struct RelayServer {
    pub cfg: ServerConfig,
    listener: FrameListener,
    hub: Arc<Mutex<Hub>>,
}

impl RelayServer {
    pub async fn bind(cfg: ServerConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.listen_addr.parse().context("parse listen_addr")?;
        let listener = FrameListener::bind(addr).await?;
        Ok(Self {
            cfg,
            listener,
            hub: Arc::default(),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> RelayHandle {
        RelayHandle {
            hub: self.hub.clone(),
        }
    }

    /// Accepts peers until the listener fails.
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            let conn = self.listener.accept().await?;
            // The slot is taken under the same lock as the capacity check.
            let admitted = self.hub.lock().await.admit(self.cfg.max_players);
            match admitted {
                Ok(Some(admission)) => {
                    tokio::spawn(serve_peer(conn, admission, self.hub.clone()));
                }
                Ok(None) => warn!(
                    peer = %conn.peer_addr(),
                    max_players = self.cfg.max_players,
                    "Relay full, refusing connection"
                ),
                Err(e) => warn!(peer = %conn.peer_addr(), error = %e, "Failed to admit peer"),
            }
        }
    }
}

async fn serve_peer(conn: FrameConn, admission: Admission, hub: Arc<Mutex<Hub>>) {
    let Admission {
        id,
        outbound,
        outbound_rx,
    } = admission;
    info!(player_id = %id, addr = %conn.peer_addr(), "Peer joined");

    let (reader, writer) = conn.into_split();
    let reason = tokio::select! {
        r = read_loop(id, reader, &outbound, &hub) => r,
        w = write_loop(writer, outbound_rx) => w,
    };

    let mut hub = hub.lock().await;
    hub.peers.remove(&id);
    match encode_msg(&ServerMsg::PlayerLeft { player_id: id }) {
        Ok(frame) => hub.broadcast_except(id, &frame),
        Err(e) => warn!(error = %e, "Failed to encode player left"),
    }
    info!(player_id = %id, reason = %reason, peers = hub.peers.len(), "Peer left");
}

async fn read_loop<R: AsyncRead + Unpin>(
    id: PlayerId,
    mut reader: FrameReader<R>,
    outbound: &mpsc::UnboundedSender<String>,
    hub: &Mutex<Hub>,
) -> String {
    loop {
        let text = match reader.recv_text().await {
            Ok(Some(text)) => text,
            Ok(None) => return "closed by peer".to_string(),
            Err(e) if e.is_recoverable() => {
                warn!(player_id = %id, error = %e, "Dropping malformed frame");
                continue;
            }
            Err(e) => return e.to_string(),
        };
        let msg = match decode_client_msg(&text) {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                debug!(player_id = %id, "Ignoring unknown message type");
                continue;
            }
            Err(e) => {
                warn!(player_id = %id, error = %e, "Dropping malformed frame");
                continue;
            }
        };
        if let Err(e) = handle_msg(id, msg, outbound, hub).await {
            warn!(player_id = %id, error = %e, "Failed to handle message");
        }
    }
}

async fn handle_msg(
    id: PlayerId,
    msg: ClientMsg,
    outbound: &mpsc::UnboundedSender<String>,
    hub: &Mutex<Hub>,
) -> anyhow::Result<()> {
    match msg {
        ClientMsg::Ping => {
            let _ = outbound.send(encode_msg(&ServerMsg::Pong)?);
        }
        ClientMsg::PlayerUpdate { x, y, angle } => {
            let frame = encode_msg(&ServerMsg::PlayerMove {
                player_id: id,
                x,
                y,
                angle,
                velocity_x: 0.0,
                velocity_y: 0.0,
            })?;
            let mut hub = hub.lock().await;
            hub.broadcast_except(id, &frame);
            if let Some(peer) = hub.peers.get_mut(&id) {
                peer.last_state = Some(frame);
            }
        }
        ClientMsg::PlayerInput { input, angle } => {
            // Movement is owned by the clients here.
            debug!(player_id = %id, ?input, angle, "Ignoring raw input");
        }
    }
    Ok(())
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: FrameWriter<W>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) -> String {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = writer.send_text(&frame).await {
            return format!("{e:#}");
        }
    }
    "queue closed".to_string()
}

/// Helper for tests: bind to an ephemeral localhost port.
pub async fn bind_ephemeral() -> anyhow::Result<(RelayServer, SocketAddr)> {
    let cfg = ServerConfig {
        listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string(),
        ..Default::default()
    };
    let server = RelayServer::bind(cfg).await?;
    let addr = server.local_addr()?;
    Ok((server, addr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{io::AsyncWriteExt, net::TcpStream};

    async fn recv(conn: &mut FrameConn) -> ServerMsg {
        let text = conn.recv_text().await.unwrap().expect("frame");
        arena_shared::net::decode_server_msg(&text).unwrap().expect("known message")
    }

    async fn join(addr: SocketAddr) -> (FrameConn, PlayerId) {
        let mut conn = FrameConn::connect(addr).await.unwrap();
        match recv(&mut conn).await {
            ServerMsg::PlayerId { player_id } => (conn, player_id),
            other => panic!("expected PLAYER_ID, got {other:?}"),
        }
    }

    async fn send(conn: &mut FrameConn, msg: &ClientMsg) {
        conn.send_text(&encode_msg(msg).unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn assigns_distinct_ids_and_answers_ping() {
        let (server, addr) = bind_ephemeral().await.unwrap();
        tokio::spawn(server.run());

        let (mut a, id_a) = join(addr).await;
        let (_b, id_b) = join(addr).await;
        assert_ne!(id_a, id_b);

        send(&mut a, &ClientMsg::Ping).await;
        assert_eq!(recv(&mut a).await, ServerMsg::Pong);
    }

    #[tokio::test]
    async fn update_fans_out_to_others_only() {
        let (server, addr) = bind_ephemeral().await.unwrap();
        tokio::spawn(server.run());

        let (mut a, id_a) = join(addr).await;
        let (mut b, _) = join(addr).await;

        send(&mut a, &ClientMsg::PlayerUpdate { x: 10.0, y: 20.0, angle: 1.5 }).await;
        match recv(&mut b).await {
            ServerMsg::PlayerMove { player_id, x, y, angle, .. } => {
                assert_eq!(player_id, id_a);
                assert_eq!((x, y, angle), (10.0, 20.0, 1.5));
            }
            other => panic!("expected playerMove, got {other:?}"),
        }

        // The sender hears nothing about itself: its next frame is the pong.
        send(&mut a, &ClientMsg::Ping).await;
        assert_eq!(recv(&mut a).await, ServerMsg::Pong);
    }

    #[tokio::test]
    async fn newcomer_receives_last_known_states() {
        let (server, addr) = bind_ephemeral().await.unwrap();
        tokio::spawn(server.run());

        let (mut a, id_a) = join(addr).await;
        send(&mut a, &ClientMsg::PlayerUpdate { x: 5.0, y: 6.0, angle: 0.0 }).await;
        // Round-trip a ping so the update is processed before the newcomer joins.
        send(&mut a, &ClientMsg::Ping).await;
        assert_eq!(recv(&mut a).await, ServerMsg::Pong);

        let (mut b, _) = join(addr).await;
        match recv(&mut b).await {
            ServerMsg::PlayerMove { player_id, x, y, .. } => {
                assert_eq!(player_id, id_a);
                assert_eq!((x, y), (5.0, 6.0));
            }
            other => panic!("expected playerMove, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_broadcasts_player_left() {
        let (server, addr) = bind_ephemeral().await.unwrap();
        let handle = server.handle();
        tokio::spawn(server.run());

        let (a, id_a) = join(addr).await;
        let (mut b, _) = join(addr).await;

        drop(a);
        assert_eq!(recv(&mut b).await, ServerMsg::PlayerLeft { player_id: id_a });
        assert_eq!(handle.peer_count().await, 1);
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames_keep_connection() {
        let (server, addr) = bind_ephemeral().await.unwrap();
        tokio::spawn(server.run());

        let (mut a, _) = join(addr).await;
        a.send_text("{not json").await.unwrap();
        a.send_text(r#"{"type":"playerUpdate","x":"nope"}"#).await.unwrap();
        a.send_text(r#"{"type":"chat","text":"hi"}"#).await.unwrap();
        send(&mut a, &ClientMsg::Ping).await;
        assert_eq!(recv(&mut a).await, ServerMsg::Pong);
    }

    #[tokio::test]
    async fn refuses_connections_above_capacity() {
        let cfg = ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            max_players: 1,
        };
        let server = RelayServer::bind(cfg).await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.handle();
        tokio::spawn(server.run());

        let (_a, _) = join(addr).await;

        let mut b = FrameConn::connect(addr).await.unwrap();
        assert!(b.recv_text().await.unwrap().is_none());
        assert_eq!(handle.peer_count().await, 1);
    }

    #[tokio::test]
    async fn burst_of_connections_never_exceeds_capacity() {
        let cfg = ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            max_players: 2,
        };
        let server = RelayServer::bind(cfg).await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.handle();
        tokio::spawn(server.run());

        let mut conns = Vec::new();
        for _ in 0..5 {
            conns.push(FrameConn::connect(addr).await.unwrap());
        }
        let mut admitted = 0;
        for conn in &mut conns {
            if conn.recv_text().await.unwrap().is_some() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 2);
        assert_eq!(handle.peer_count().await, 2);
    }

    #[tokio::test]
    async fn non_utf8_frame_is_dropped_and_connection_kept() {
        let (server, addr) = bind_ephemeral().await.unwrap();
        tokio::spawn(server.run());

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half);
        let welcome = reader.recv_text().await.unwrap().expect("frame");
        assert!(matches!(
            arena_shared::net::decode_server_msg(&welcome).unwrap(),
            Some(ServerMsg::PlayerId { .. })
        ));

        write_half.write_all(&2u32.to_be_bytes()).await.unwrap();
        write_half.write_all(&[0xff, 0xfe]).await.unwrap();
        FrameWriter::new(write_half).send(&ClientMsg::Ping).await.unwrap();

        assert_eq!(reader.recv_text().await.unwrap().as_deref(), Some(r#"{"type":"pong"}"#));
    }
}
