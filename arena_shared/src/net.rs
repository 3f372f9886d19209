//! Networking primitives.
//!
//! Goals:
//! - Provide the JSON message types exchanged by client and relay.
//! - Provide a persistent, length-prefixed text frame channel over TCP.
//! - Keep decoding failures recoverable: one bad frame never tears down a
//!   connection.
//!
//! Every frame is one JSON object tagged by its `type` field. Frames whose
//! type is not known to the receiver decode to `Ok(None)` and are ignored.

use std::{
    io::ErrorKind,
    net::SocketAddr,
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::Context;
use bytes::{BufMut, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

/// Largest frame accepted from a peer.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

static NEXT_PLAYER_ID: AtomicU64 = AtomicU64::new(1);

/// Server-assigned identifier of a connected player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl PlayerId {
    pub fn new_unique() -> Self {
        PlayerId(NEXT_PLAYER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Directional key flags sampled for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InputFlags {
    #[serde(default)]
    pub up: bool,
    #[serde(default)]
    pub down: bool,
    #[serde(default)]
    pub left: bool,
    #[serde(default)]
    pub right: bool,
}

/// Client -> server messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMsg {
    /// Latency probe, answered by [`ServerMsg::Pong`].
    #[serde(rename = "ping")]
    Ping,
    /// Raw input for servers that own movement.
    #[serde(rename = "playerInput")]
    PlayerInput { input: InputFlags, angle: f32 },
    /// Locally predicted state.
    #[serde(rename = "playerUpdate")]
    PlayerUpdate { x: f32, y: f32, angle: f32 },
}

impl ClientMsg {
    pub const KNOWN_TYPES: &'static [&'static str] = &["ping", "playerInput", "playerUpdate"];
}

/// Server -> client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMsg {
    /// Assigns the receiving session its id. Sent once per connection.
    #[serde(rename = "PLAYER_ID", rename_all = "camelCase")]
    PlayerId { player_id: PlayerId },
    #[serde(rename = "pong")]
    Pong,
    /// Authoritative or peer state for one player.
    #[serde(rename = "playerMove", alias = "PLAYER_MOVE", rename_all = "camelCase")]
    PlayerMove {
        player_id: PlayerId,
        x: f32,
        y: f32,
        angle: f32,
        #[serde(default)]
        velocity_x: f32,
        #[serde(default)]
        velocity_y: f32,
    },
    #[serde(rename = "playerLeft", alias = "PLAYER_LEFT", rename_all = "camelCase")]
    PlayerLeft { player_id: PlayerId },
}

impl ServerMsg {
    pub const KNOWN_TYPES: &'static [&'static str] = &[
        "PLAYER_ID",
        "pong",
        "playerMove",
        "PLAYER_MOVE",
        "playerLeft",
        "PLAYER_LEFT",
    ];
}

/// Why a text frame could not be turned into a message.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame has no string `type` field")]
    MissingType,
    #[error("malformed `{kind}` message: {source}")]
    Invalid {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Decodes a frame received by a client. Unknown message types yield `Ok(None)`.
pub fn decode_server_msg(text: &str) -> Result<Option<ServerMsg>, DecodeError> {
    decode_tagged(text, ServerMsg::KNOWN_TYPES)
}

/// Decodes a frame received by a server. Unknown message types yield `Ok(None)`.
pub fn decode_client_msg(text: &str) -> Result<Option<ClientMsg>, DecodeError> {
    decode_tagged(text, ClientMsg::KNOWN_TYPES)
}

fn decode_tagged<T: DeserializeOwned>(
    text: &str,
    known: &[&str],
) -> Result<Option<T>, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(DecodeError::MissingType)?
        .to_owned();
    if !known.contains(&kind.as_str()) {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|source| DecodeError::Invalid { kind, source })
}

/// Serializes any protocol message to its text frame.
pub fn encode_msg<T: Serialize>(msg: &T) -> anyhow::Result<String> {
    serde_json::to_string(msg).context("serialize msg")
}

/// Why a frame could not be read.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("frame of {0} bytes exceeds the size limit")]
    TooLong(usize),
    /// The whole frame was consumed; the stream is still in sync.
    #[error("frame is not utf-8: {0}")]
    NotUtf8(#[from] std::string::FromUtf8Error),
}

impl FrameError {
    /// True if the reader can carry on with the next frame.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::NotUtf8(_))
    }
}

/// Reads length-prefixed text frames.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Receives one frame. Returns `Ok(None)` when the peer closed the stream
    /// between frames.
    pub async fn recv_text(&mut self) -> Result<Option<String>, FrameError> {
        let mut len_buf = [0u8; 4];
        match self.inner.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(source) => {
                return Err(FrameError::Io {
                    context: "tcp read len",
                    source,
                })
            }
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            return Err(FrameError::TooLong(len));
        }
        let mut payload = vec![0u8; len];
        self.inner
            .read_exact(&mut payload)
            .await
            .map_err(|source| FrameError::Io {
                context: "tcp read payload",
                source,
            })?;
        Ok(Some(String::from_utf8(payload)?))
    }
}

/// Writes length-prefixed text frames.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send_text(&mut self, text: &str) -> anyhow::Result<()> {
        let payload = text.as_bytes();
        if payload.len() > MAX_FRAME_LEN {
            anyhow::bail!("frame of {} bytes exceeds limit", payload.len());
        }
        let mut buf = BytesMut::with_capacity(4 + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.extend_from_slice(payload);
        self.inner.write_all(&buf).await.context("tcp write")?;
        Ok(())
    }

    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        let text = encode_msg(msg)?;
        self.send_text(&text).await
    }
}

/// Persistent framed connection over TCP.
#[derive(Debug)]
pub struct FrameConn {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
    peer: SocketAddr,
}

impl FrameConn {
    pub fn new(stream: TcpStream) -> anyhow::Result<Self> {
        let peer = stream.peer_addr().context("peer addr")?;
        stream.set_nodelay(true).context("set nodelay")?;
        let (r, w) = stream.into_split();
        Ok(Self {
            reader: FrameReader::new(r),
            writer: FrameWriter::new(w),
            peer,
        })
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        Self::new(stream)
    }

    pub async fn send_text(&mut self, text: &str) -> anyhow::Result<()> {
        self.writer.send_text(text).await
    }

    pub async fn recv_text(&mut self) -> Result<Option<String>, FrameError> {
        self.reader.recv_text().await
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Splits into independently owned halves so reading and writing can run
    /// in separate tasks.
    pub fn into_split(self) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        (self.reader, self.writer)
    }
}

/// TCP listener producing framed connections.
pub struct FrameListener {
    listener: TcpListener,
}

impl FrameListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<FrameConn> {
        let (stream, _addr) = self.listener.accept().await.context("tcp accept")?;
        FrameConn::new(stream)
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}
