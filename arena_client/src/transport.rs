//! Socket-backed message channel.
//!
//! A [`SocketChannel`] connects in a background task and forwards everything
//! it hears as [`ChannelEvent`]s. The owner only ever sees whole frames,
//! between its own steps.

use std::net::SocketAddr;

use arena_shared::net::{FrameConn, FrameReader, FrameWriter};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::session::MessageChannel;

/// Something that happened on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    Message(String),
    /// Connect failed or the connection ended, with the reason.
    Closed(String),
}

pub struct SocketChannel {
    open: bool,
    closed: bool,
    outbound: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    task: JoinHandle<()>,
}

impl SocketChannel {
    /// Starts connecting to `addr`. Progress arrives through
    /// [`SocketChannel::next_event`].
    pub fn connect(addr: SocketAddr) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_connection(addr, outbound_rx, events_tx));
        Self {
            open: false,
            closed: false,
            outbound,
            events,
            task,
        }
    }

    /// Waits for the next event. Cancel safe. After `Closed` this never resolves.
    pub async fn next_event(&mut self) -> ChannelEvent {
        if self.closed {
            return std::future::pending::<ChannelEvent>().await;
        }
        let event = self
            .events
            .recv()
            .await
            .unwrap_or_else(|| ChannelEvent::Closed("connection task ended".to_string()));
        match &event {
            ChannelEvent::Opened => self.open = true,
            ChannelEvent::Closed(_) => {
                self.open = false;
                self.closed = true;
            }
            ChannelEvent::Message(_) => {}
        }
        event
    }
}

impl MessageChannel for SocketChannel {
    fn is_open(&self) -> bool {
        self.open
    }

    fn send_text(&mut self, text: String) -> anyhow::Result<()> {
        self.outbound
            .send(text)
            .map_err(|_| anyhow::anyhow!("connection writer has stopped"))
    }
}

impl Drop for SocketChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_connection(
    addr: SocketAddr,
    outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let conn = match FrameConn::connect(addr).await {
        Ok(conn) => conn,
        Err(e) => {
            let _ = events.send(ChannelEvent::Closed(format!("{e:#}")));
            return;
        }
    };
    debug!(peer = %conn.peer_addr(), "Socket connected");
    let _ = events.send(ChannelEvent::Opened);

    // Both loops live in this task so aborting it tears the socket down.
    let (reader, writer) = conn.into_split();
    let reason = tokio::select! {
        r = read_loop(reader, events.clone()) => r,
        w = write_loop(writer, outbound) => w,
    };
    let _ = events.send(ChannelEvent::Closed(reason));
}

async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: FrameReader<R>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) -> String {
    loop {
        match reader.recv_text().await {
            Ok(Some(text)) => {
                if events.send(ChannelEvent::Message(text)).is_err() {
                    return "channel dropped".to_string();
                }
            }
            Ok(None) => return "closed by peer".to_string(),
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "Dropping malformed frame");
            }
            Err(e) => return e.to_string(),
        }
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: FrameWriter<W>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) -> String {
    while let Some(text) = outbound.recv().await {
        if let Err(e) = writer.send_text(&text).await {
            return format!("{e:#}");
        }
    }
    "channel dropped".to_string()
}
