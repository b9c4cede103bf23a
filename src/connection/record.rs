//! Per-connection record.
//!
//! A [`Connection`] is created when a socket is accepted and dropped once it
//! leaves the registry and its tasks finish. The immutable parts (id, peer,
//! outbound channel) are readable without locking; everything a packet can
//! change lives in [`ConnectionData`] behind the connection's [`UpgradeLock`].

use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;
use uuid::Uuid;

use crate::connection::lock::{LazyGuard, UpgradeLock};
use crate::core::frame::RawFrame;
use crate::error::{ProtocolError, Result};
use crate::protocol::events::ClientSettings;
use crate::protocol::state::ConnectionState;

pub type ConnectionId = u64;

/// Work for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Length-prefixed and written.
    Frame(RawFrame),
    /// Written as-is (legacy ping reply).
    Raw(Bytes),
    /// Flush what is queued, then close the socket.
    Close,
}

/// Last position and orientation reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,
}

/// Liveness counters maintained by the protocol layer.
#[derive(Debug, Clone, Default)]
pub struct Liveness {
    /// Last time the client answered a keep-alive (or logged in).
    pub last_keep_alive: Option<Instant>,
    /// Id of the keep-alive sent and not yet answered.
    pub pending_keep_alive: Option<i64>,
}

/// Mutable state of one connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionData {
    pub state: ConnectionState,
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub name: Option<String>,
    pub uuid: Option<Uuid>,
    pub position: PlayerPosition,
    pub settings: Option<ClientSettings>,
    pub held_slot: i16,
    pub liveness: Liveness,
}

#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    connected_at: Instant,
    outbound: mpsc::UnboundedSender<Outbound>,
    shutdown: CancellationToken,
    packets_received: AtomicU64,
    data: UpgradeLock<ConnectionData>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        peer: SocketAddr,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            id,
            peer,
            connected_at: Instant::now(),
            outbound,
            shutdown: CancellationToken::new(),
            packets_received: AtomicU64::new(0),
            data: UpgradeLock::new(ConnectionData::default()),
        }
    }

    /// A connection whose cancellation follows `parent` (the server's token).
    pub fn with_parent(
        id: ConnectionId,
        peer: SocketAddr,
        outbound: mpsc::UnboundedSender<Outbound>,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            shutdown: parent.child_token(),
            ..Self::new(id, peer, outbound)
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    pub fn lock(&self) -> &UpgradeLock<ConnectionData> {
        &self.data
    }

    /// A fresh lazy guard over this connection's record.
    pub fn guard(&self) -> LazyGuard<'_, ConnectionData> {
        self.data.lazy()
    }

    /// Counts a decoded frame and returns the new total.
    pub fn record_packet(&self) -> u64 {
        self.packets_received.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received.load(Ordering::Relaxed)
    }

    /// Current state, read under a short shared lock.
    pub fn state(&self) -> ConnectionState {
        self.data.read().state
    }

    /// Queues a frame for the writer task.
    pub fn send(&self, frame: RawFrame) -> Result<()> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }
        trace!(conn_id = self.id, packet_id = frame.packet_id, "Queueing frame");
        self.outbound
            .send(Outbound::Frame(frame))
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Queues bytes that bypass framing.
    pub fn send_raw(&self, bytes: Bytes) -> Result<()> {
        self.outbound
            .send(Outbound::Raw(bytes))
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Asks the writer to flush and close, and stops the reader.
    ///
    /// Idempotent. Frames queued before the call are still written.
    pub fn close(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let _ = self.outbound.send(Outbound::Close);
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled when the connection is closing.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn connection() -> (Connection, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(7, "127.0.0.1:1".parse().unwrap(), tx), rx)
    }

    #[test]
    fn test_new_connection_is_handshaking() {
        let (conn, _rx) = connection();
        assert_eq!(conn.id(), 7);
        assert_eq!(conn.state(), ConnectionState::Handshaking);
        assert!(!conn.is_closed());
    }

    #[test]
    fn test_send_then_close_ordering() {
        let (conn, mut rx) = connection();
        conn.send(RawFrame::new(1, vec![1])).unwrap();
        conn.close();
        conn.close();

        assert_eq!(rx.try_recv().unwrap(), Outbound::Frame(RawFrame::new(1, vec![1])));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close);
        assert!(rx.try_recv().is_err());
        assert!(matches!(
            conn.send(RawFrame::new(2, vec![])),
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_send_after_writer_gone() {
        let (conn, rx) = connection();
        drop(rx);
        assert!(conn.send(RawFrame::new(0, vec![])).is_err());
    }

    #[test]
    fn test_parent_token_closes_child() {
        let parent = CancellationToken::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = Connection::with_parent(1, "127.0.0.1:2".parse().unwrap(), tx, &parent);
        parent.cancel();
        assert!(conn.is_closed());
    }

    #[test]
    fn test_guard_mutates_record() {
        let (conn, _rx) = connection();
        let mut guard = conn.guard();
        guard.write().state = ConnectionState::Login;
        drop(guard);
        assert_eq!(conn.state(), ConnectionState::Login);
    }
}
