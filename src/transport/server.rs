//! # Connection Multiplexer
//!
//! TCP front end of the server. One acceptor task takes new sockets and
//! registers them; every connection then gets a reader task and a writer task.
//!
//! - The reader performs bounded reads (`read_buffer_size`) and feeds them to
//!   the connection's [`FrameReader`], which keeps partial frames across reads.
//!   Decoded frames go to the worker that owns the connection, or are
//!   dispatched inline when no workers are configured.
//! - The writer drains the connection's outbound queue through [`FrameCodec`].
//! - A keep-alive task pings players and drops the silent ones.
//!
//! Every blocking wait (accept, read) is bounded by `poll_timeout`, after
//! which the running flag is checked again. A socket error or a zero-byte read
//! ends that connection only; it is never retried.

use bytes::Bytes;
use futures::SinkExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{timeout, MissedTickBehavior};
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::{NetworkConfig, ServerConfig};
use crate::connection::record::{Connection, ConnectionId, Outbound};
use crate::connection::registry::ConnectionRegistry;
use crate::core::codec::FrameCodec;
use crate::core::frame::{is_legacy_ping, FrameReader, RawFrame};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::clientbound;
use crate::protocol::dispatcher::{disconnect_with_reason, Dispatcher};
use crate::protocol::state::ConnectionState;
use crate::transport::worker::WorkerPool;
use crate::utils::metrics::{global_metrics, Timer};

struct Shared {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<ConnectionRegistry>,
    workers: Option<WorkerPool>,
    shutdown: CancellationToken,
}

/// A configured server. Register callbacks on [`dispatcher`](Self::dispatcher),
/// keep a [`handle`](Self::handle), then call [`run`](Self::run).
pub struct Server {
    shared: Arc<Shared>,
}

impl Server {
    pub fn new(config: NetworkConfig) -> Result<Self> {
        config.validate_strict()?;

        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(
            Dispatcher::new(Arc::clone(&registry)).with_status(config.protocol.status_info()),
        );
        Self::with_dispatcher(config.server, dispatcher)
    }

    /// Builds a server around an existing dispatcher, sharing its registry.
    pub fn with_dispatcher(config: ServerConfig, dispatcher: Arc<Dispatcher>) -> Result<Self> {
        let workers = match config.worker_threads {
            0 => None,
            n => Some(WorkerPool::new(n)?),
        };
        let registry = Arc::clone(dispatcher.registry());

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                dispatcher,
                registry,
                workers,
                shutdown: CancellationToken::new(),
            }),
        })
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.shared.dispatcher
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.shared.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: self.shared.shutdown.clone(),
            dispatcher: Arc::clone(&self.shared.dispatcher),
        }
    }

    /// Frames `payload` under `packet_id` and queues it for connection `id`.
    pub fn send(&self, id: ConnectionId, packet_id: i32, payload: impl Into<Bytes>) -> Result<()> {
        self.handle().send(id, packet_id, payload)
    }

    /// Binds the configured address and serves until shut down.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.shared.config.address).await?;
        self.run_with_listener(listener).await
    }

    /// Serves connections from `listener` until [`ServerHandle::shutdown`] is called.
    #[instrument(skip(self, listener), fields(address = ?listener.local_addr().ok()))]
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<()> {
        let shared = self.shared;
        info!(
            max_connections = shared.config.max_connections,
            workers = shared.config.worker_threads,
            "Listening"
        );

        tokio::spawn(keep_alive_loop(Arc::clone(&shared)));

        let poll_timeout = shared.config.poll_timeout;
        while !shared.shutdown.is_cancelled() {
            match timeout(poll_timeout, listener.accept()).await {
                // bounded wait elapsed; check the running flag again
                Err(_) => continue,
                Ok(Ok((stream, peer))) => accept(&shared, stream, peer),
                Ok(Err(e)) => warn!(error = %e, "Error accepting connection"),
            }
        }
        drop(listener);

        info!(
            connections = shared.registry.len(),
            "Shutting down server. Waiting for connections to close..."
        );
        drain(&shared).await;
        global_metrics().log_metrics();
        Ok(())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("address", &self.shared.config.address)
            .field("connections", &self.shared.registry.len())
            .finish()
    }
}

/// Cloneable control surface for a running server.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    shutdown: CancellationToken,
    dispatcher: Arc<Dispatcher>,
}

impl ServerHandle {
    /// Asks the server to stop. Loops notice within one poll timeout.
    pub fn shutdown(&self) {
        info!("Shutdown requested");
        self.shutdown.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    pub fn connection_count(&self) -> usize {
        self.dispatcher.registry().len()
    }

    pub fn players_online(&self) -> usize {
        self.dispatcher.players_online()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Frames `payload` under `packet_id` and queues it for connection `id`.
    ///
    /// # Errors
    /// [`ProtocolError::UnknownConnection`] if `id` is not registered,
    /// [`ProtocolError::ConnectionClosed`] if it is closing.
    pub fn send(&self, id: ConnectionId, packet_id: i32, payload: impl Into<Bytes>) -> Result<()> {
        let conn = self
            .dispatcher
            .registry()
            .get(id)
            .ok_or(ProtocolError::UnknownConnection(id))?;
        let frame = RawFrame::new(packet_id, payload);
        global_metrics().frame_sent(frame.encoded_len() as u64);
        conn.send(frame)
    }

    /// Closes connection `id` with a disconnect reason suited to its state.
    pub fn disconnect(&self, id: ConnectionId, reason: &str) -> Result<()> {
        let conn = self
            .dispatcher
            .registry()
            .get(id)
            .ok_or(ProtocolError::UnknownConnection(id))?;
        disconnect_with_reason(&conn, reason);
        Ok(())
    }
}

fn accept(shared: &Arc<Shared>, stream: TcpStream, peer: SocketAddr) {
    if shared.registry.len() >= shared.config.max_connections {
        global_metrics().connection_rejected();
        warn!(
            peer = %peer,
            limit = shared.config.max_connections,
            "{}",
            constants::ERR_CONNECTION_LIMIT
        );
        return;
    }

    if let Err(e) = stream.set_nodelay(true) {
        debug!(peer = %peer, error = %e, "Could not set TCP_NODELAY");
    }

    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();
    let conn = Arc::new(Connection::with_parent(
        shared.registry.next_id(),
        peer,
        tx,
        &shared.shutdown,
    ));
    shared.registry.insert(Arc::clone(&conn));
    global_metrics().connection_established();
    info!(conn_id = conn.id(), peer = %peer, "Connection accepted");

    tokio::spawn(write_loop(
        conn.id(),
        write_half,
        rx,
        conn.shutdown_token().clone(),
        shared.config.max_frame_length,
    ));
    tokio::spawn(read_loop(Arc::clone(shared), conn, read_half));
}

async fn read_loop(shared: Arc<Shared>, conn: Arc<Connection>, mut socket: OwnedReadHalf) {
    let mut reader = FrameReader::new(shared.config.max_frame_length);
    let mut buf = vec![0u8; shared.config.read_buffer_size];

    while !conn.is_closed() {
        let n = match timeout(shared.config.poll_timeout, socket.read(&mut buf)).await {
            Err(_) => continue,
            Ok(Ok(0)) => {
                debug!(conn_id = conn.id(), "Peer closed the connection");
                break;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                debug!(conn_id = conn.id(), error = %e, "Read failed");
                break;
            }
        };
        global_metrics().bytes_read(n as u64);
        let chunk = &buf[..n];

        if reader.is_pristine()
            && is_legacy_ping(chunk)
            && conn.state() == ConnectionState::Handshaking
        {
            answer_legacy_ping(&shared, &conn);
            break;
        }

        match reader.feed(chunk) {
            Ok(frames) => {
                trace!(conn_id = conn.id(), frames = frames.len(), buffered = reader.buffered(), "Read");
                for frame in frames {
                    submit(&shared, &conn, frame);
                }
            }
            Err(e) => {
                // the reader discarded its buffer; nothing more can be framed
                shared.dispatcher.report_error(&conn, &e);
                break;
            }
        }
    }

    teardown(&shared, conn);
}

fn answer_legacy_ping(shared: &Shared, conn: &Connection) {
    global_metrics().legacy_ping();
    debug!(conn_id = conn.id(), peer = %conn.peer(), "Legacy server list ping");
    let kick = clientbound::legacy_kick(
        shared.dispatcher.status(),
        shared.dispatcher.players_online(),
    );
    if let Err(e) = conn.send_raw(kick) {
        debug!(conn_id = conn.id(), error = %e, "Could not answer legacy ping");
    }
    conn.close();
}

fn submit(shared: &Shared, conn: &Arc<Connection>, frame: RawFrame) {
    match &shared.workers {
        Some(pool) => {
            let dispatcher = Arc::clone(&shared.dispatcher);
            let target = Arc::clone(conn);
            let queued = pool.submit(conn.id(), move || dispatcher.handle_frame(&target, frame));
            if let Err(e) = queued {
                warn!(conn_id = conn.id(), error = %e, "Could not queue frame");
                conn.close();
            }
        }
        None => shared.dispatcher.handle_frame(conn, frame),
    }
}

/// Unregisters `conn`. The closing bookkeeping runs behind any frames
/// already queued for it.
fn teardown(shared: &Shared, conn: Arc<Connection>) {
    let id = conn.id();
    conn.close();
    shared.registry.remove(id);

    let dispatcher = Arc::clone(&shared.dispatcher);
    let finish = move || {
        dispatcher.connection_closed(&conn);
        global_metrics().connection_closed();
        info!(
            conn_id = conn.id(),
            peer = %conn.peer(),
            packets = conn.packets_received(),
            duration_ms = conn.connected_at().elapsed().as_millis() as u64,
            "Connection closed"
        );
    };

    match &shared.workers {
        Some(pool) => {
            if pool.submit(id, finish).is_err() {
                warn!(conn_id = id, "Worker pool gone during teardown");
            }
        }
        None => finish(),
    }
}

async fn write_loop(
    conn_id: ConnectionId,
    socket: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    closing: CancellationToken,
    max_frame_length: usize,
) {
    let mut sink = FramedWrite::new(socket, FrameCodec::new(max_frame_length));

    loop {
        // queued output is written before a close is honoured
        let item = tokio::select! {
            biased;
            item = outbound.recv() => item,
            _ = closing.cancelled() => None,
        };
        let result = match item {
            Some(Outbound::Frame(frame)) => sink.send(frame).await,
            Some(Outbound::Raw(bytes)) => write_raw(&mut sink, &bytes).await,
            Some(Outbound::Close) | None => break,
        };
        if let Err(e) = result {
            debug!(conn_id, error = %e, "Write failed");
            closing.cancel();
            break;
        }
    }

    let _ = SinkExt::<RawFrame>::flush(&mut sink).await;
    let _ = sink.get_mut().shutdown().await;
    trace!(conn_id, "Writer finished");
}

async fn write_raw(sink: &mut FramedWrite<OwnedWriteHalf, FrameCodec>, bytes: &[u8]) -> Result<()> {
    SinkExt::<RawFrame>::flush(sink).await?;
    sink.get_mut().write_all(bytes).await?;
    Ok(())
}

async fn keep_alive_loop(shared: Arc<Shared>) {
    let mut ticker = tokio::time::interval(shared.config.keep_alive_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            _ = ticker.tick() => {
                // record locks block, so sweep off the runtime threads
                let registry = Arc::clone(&shared.registry);
                let keep_alive_timeout = shared.config.keep_alive_timeout;
                let sweep = tokio::task::spawn_blocking(move || {
                    sweep_keep_alive(&registry, keep_alive_timeout)
                });
                match sweep.await {
                    Ok(0) => {}
                    Ok(dropped) => debug!(dropped, "Keep-alive sweep dropped players"),
                    Err(e) => warn!(error = %e, "Keep-alive sweep failed"),
                }
            }
        }
    }
    debug!("Keep-alive task stopped");
}

/// Pings every player without a pending keep-alive and disconnects players
/// silent for longer than `keep_alive_timeout`. Returns how many were dropped.
pub(crate) fn sweep_keep_alive(registry: &ConnectionRegistry, keep_alive_timeout: Duration) -> usize {
    let now = Instant::now();
    let id = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default();
    let mut dropped = 0;

    // one connection lock at a time; the registry lock is already released
    for conn in registry.snapshot() {
        let mut guard = conn.guard();
        if guard.read().state != ConnectionState::Play {
            continue;
        }

        let (last, pending) = {
            let liveness = &guard.read().liveness;
            (liveness.last_keep_alive, liveness.pending_keep_alive)
        };
        let silent = last.map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        if silent > keep_alive_timeout {
            drop(guard);
            global_metrics().keep_alive_timeout();
            info!(conn_id = conn.id(), silent_ms = silent.as_millis() as u64, "Keep-alive timeout");
            disconnect_with_reason(&conn, constants::ERR_TIMED_OUT);
            dropped += 1;
            continue;
        }
        if pending.is_some() {
            continue;
        }

        guard.write().liveness.pending_keep_alive = Some(id);
        drop(guard);
        let frame = clientbound::keep_alive(id);
        let len = frame.encoded_len() as u64;
        if conn.send(frame).is_ok() {
            global_metrics().frame_sent(len);
        }
    }
    dropped
}

async fn drain(shared: &Shared) {
    let _timer = Timer::start("shutdown_drain");
    let deadline = tokio::time::sleep(shared.config.shutdown_timeout);
    tokio::pin!(deadline);
    let mut tick = tokio::time::interval(shared.config.poll_timeout);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                warn!(remaining = shared.registry.len(), "Shutdown timeout reached, forcing exit");
                for conn in shared.registry.drain() {
                    conn.close();
                }
                break;
            }
            _ = tick.tick() => {
                let connections = shared.registry.len();
                if connections == 0 {
                    info!("All connections closed, shutting down");
                    break;
                }
                debug!(connections, "Waiting for connections to close");
            }
        }
    }
}
