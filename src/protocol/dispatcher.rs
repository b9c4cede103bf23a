//! # Dispatch
//!
//! Routes decoded frames to built-in protocol handling and then to game-logic
//! callbacks registered per [`EventKind`].
//!
//! For every frame the dispatcher:
//! 1. reads the connection's state through a lazy shared guard,
//! 2. picks the packet table for the connection's protocol version,
//! 3. looks the packet id up in that state's table and decodes the payload,
//! 4. applies the state machine and record updates the protocol owns,
//! 5. invokes the registered callbacks with a [`HandlerContext`].
//!
//! Any error along the way goes to the error callback, whose default is to log
//! and disconnect the offending connection. Nothing a client sends reaches
//! another connection or the process.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::connection::lock::{Access, LazyGuard, Upgrade};
use crate::connection::record::{Connection, ConnectionData, ConnectionId};
use crate::connection::registry::ConnectionRegistry;
use crate::core::frame::RawFrame;
use crate::error::{ProtocolError, Result};
use crate::protocol::clientbound::{self, StatusInfo};
use crate::protocol::events::{Event, EventKind};
use crate::protocol::handshake;
use crate::protocol::packets;
use crate::protocol::state::ConnectionState;
use crate::utils::identity::{IdentityProvider, OfflineIdentity};
use crate::utils::metrics::global_metrics;

type EventHandler = dyn Fn(&mut HandlerContext<'_>, &Event) -> Result<()> + Send + Sync + 'static;
type ErrorHandler = dyn Fn(&Connection, &ProtocolError) -> ErrorAction + Send + Sync + 'static;

/// What to do with a connection after a frame failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    Disconnect,
    Ignore,
}

/// Log, then disconnect on anything the client caused.
pub fn default_error_policy(conn: &Connection, err: &ProtocolError) -> ErrorAction {
    warn!(conn_id = conn.id(), peer = %conn.peer(), error = %err, "Protocol error");
    if err.is_disconnect() {
        ErrorAction::Disconnect
    } else {
        ErrorAction::Ignore
    }
}

pub struct Dispatcher {
    handlers: RwLock<HashMap<EventKind, Vec<Arc<EventHandler>>>>,
    error_handler: RwLock<Arc<ErrorHandler>>,
    identity: Arc<dyn IdentityProvider>,
    status: StatusInfo,
    registry: Arc<ConnectionRegistry>,
    players_online: AtomicUsize,
}

impl Dispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        let on_error: Arc<ErrorHandler> = Arc::new(default_error_policy);
        Self {
            handlers: RwLock::new(HashMap::new()),
            error_handler: RwLock::new(on_error),
            identity: Arc::new(OfflineIdentity),
            status: StatusInfo::default(),
            registry,
            players_online: AtomicUsize::new(0),
        }
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_status(mut self, status: StatusInfo) -> Self {
        self.status = status;
        self
    }

    /// Adds a callback for one event kind. Callbacks run in registration order.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&mut HandlerContext<'_>, &Event) -> Result<()> + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Replaces the error callback.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&Connection, &ProtocolError) -> ErrorAction + Send + Sync + 'static,
    {
        let handler: Arc<ErrorHandler> = Arc::new(handler);
        *self.error_handler.write() = handler;
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn status(&self) -> &StatusInfo {
        &self.status
    }

    pub fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }

    /// Connections that completed login and have not disconnected.
    pub fn players_online(&self) -> usize {
        self.players_online.load(Ordering::Relaxed)
    }

    pub(crate) fn player_joined(&self) {
        self.players_online.fetch_add(1, Ordering::Relaxed);
        global_metrics().login();
    }

    /// Bookkeeping for a connection leaving the registry. Marks it closed.
    pub fn connection_closed(&self, conn: &Connection) {
        let mut guard = conn.guard();
        if guard.read().state == ConnectionState::Play {
            let _ = self
                .players_online
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        }
        if guard.read().state != ConnectionState::Closed {
            guard.write().state = ConnectionState::Closed;
        }
    }

    /// Decodes and dispatches one frame, reporting any failure to the error callback.
    pub fn handle_frame(&self, conn: &Arc<Connection>, frame: RawFrame) {
        if conn.is_closed() {
            trace!(conn_id = conn.id(), "Dropping frame for closed connection");
            return;
        }

        if let Err(err) = self.dispatch(conn, frame) {
            self.report_error(conn, &err);
        }
    }

    /// Applies the error callback's verdict for `err` on `conn`.
    pub fn report_error(&self, conn: &Connection, err: &ProtocolError) {
        global_metrics().protocol_error();
        if matches!(err, ProtocolError::InvalidPacket { .. }) {
            global_metrics().invalid_packet();
        }

        let handler = self.error_handler.read().clone();
        if handler(conn, err) == ErrorAction::Disconnect {
            disconnect_with_reason(conn, &err.to_string());
        }
    }

    /// Decodes one frame and runs its handlers.
    ///
    /// # Errors
    /// - [`ProtocolError::InvalidState`] if the connection has no packet table
    /// - [`ProtocolError::InvalidPacket`] if the id is unknown in the current state;
    ///   the state is left unchanged
    /// - [`ProtocolError::InvalidLength`] if the payload is too short for the packet
    /// - whatever a callback returns
    pub fn dispatch(&self, conn: &Arc<Connection>, frame: RawFrame) -> Result<()> {
        conn.record_packet();
        global_metrics().frame_received();

        let mut ctx = HandlerContext::new(conn, self);
        let (state, version) = {
            let record = ctx.record();
            (record.state, record.protocol_version)
        };

        let spec = packets::table_for(version).lookup(state, frame.packet_id)?;
        trace!(
            conn_id = conn.id(),
            state = %state,
            packet_id = frame.packet_id,
            packet = spec.name,
            "Dispatching packet"
        );

        let event = spec.decode(frame.payload)?;
        let follow_up = handshake::apply(&mut ctx, &event)?;

        self.emit(&mut ctx, &event)?;
        if let Some(follow_up) = follow_up {
            self.emit(&mut ctx, &follow_up)?;
        }
        Ok(())
    }

    fn emit(&self, ctx: &mut HandlerContext<'_>, event: &Event) -> Result<()> {
        let handlers = match self.handlers.read().get(&event.kind()) {
            Some(handlers) => handlers.clone(),
            None => return Ok(()),
        };
        for handler in handlers {
            handler(ctx, event)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("event_kinds", &self.handlers.read().len())
            .field("status", &self.status)
            .field("players_online", &self.players_online())
            .finish()
    }
}

/// Sends the state-appropriate disconnect packet, then closes.
pub fn disconnect_with_reason(conn: &Connection, reason: &str) {
    let frame = match conn.state() {
        ConnectionState::Login => clientbound::login_disconnect(reason),
        ConnectionState::Play => clientbound::play_disconnect(reason),
        _ => {
            conn.close();
            return;
        }
    };
    match frame {
        Ok(frame) => {
            let _ = conn.send(frame);
        }
        Err(e) => debug!(conn_id = conn.id(), error = %e, "Could not encode disconnect reason"),
    }
    conn.close();
}

/// What a callback gets: the connection, a lazy guard over its record, and a
/// way to reach other connections.
///
/// The guard starts released. [`record`](Self::record) takes shared access,
/// [`record_mut`](Self::record_mut) upgrades it. Touching another connection
/// through [`with_connection`](Self::with_connection) or
/// [`broadcast`](Self::broadcast) first releases this connection's guard, so a
/// handler never holds two connection locks at once.
pub struct HandlerContext<'a> {
    conn: &'a Arc<Connection>,
    guard: LazyGuard<'a, ConnectionData>,
    dispatcher: &'a Dispatcher,
}

impl<'a> HandlerContext<'a> {
    pub fn new(conn: &'a Arc<Connection>, dispatcher: &'a Dispatcher) -> Self {
        Self {
            conn,
            guard: conn.guard(),
            dispatcher,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.conn.id()
    }

    pub fn connection(&self) -> &Arc<Connection> {
        self.conn
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        self.dispatcher
    }

    pub fn record(&mut self) -> &ConnectionData {
        self.guard.read()
    }

    pub fn record_mut(&mut self) -> &mut ConnectionData {
        self.guard.write()
    }

    pub fn upgrade(&mut self) -> Upgrade {
        self.guard.upgrade()
    }

    pub fn downgrade(&mut self) {
        self.guard.downgrade();
    }

    pub fn release(&mut self) {
        self.guard.release();
    }

    pub fn access(&self) -> Access {
        self.guard.access()
    }

    pub fn send(&self, frame: RawFrame) -> Result<()> {
        global_metrics().frame_sent(frame.encoded_len() as u64);
        self.conn.send(frame)
    }

    pub fn send_to(&self, id: ConnectionId, frame: RawFrame) -> Result<()> {
        let target = self
            .dispatcher
            .registry
            .get(id)
            .ok_or(ProtocolError::UnknownConnection(id))?;
        global_metrics().frame_sent(frame.encoded_len() as u64);
        target.send(frame)
    }

    /// Runs `f` with a lazy guard over another connection's record.
    ///
    /// This connection's own guard is released first. For this connection's
    /// own id, `f` receives the handler's guard instead.
    pub fn with_connection<R>(
        &mut self,
        id: ConnectionId,
        f: impl FnOnce(&mut LazyGuard<'_, ConnectionData>) -> R,
    ) -> Result<R> {
        if id == self.conn.id() {
            return Ok(f(&mut self.guard));
        }
        let target = self
            .dispatcher
            .registry
            .get(id)
            .ok_or(ProtocolError::UnknownConnection(id))?;
        self.guard.release();
        let mut guard = target.guard();
        Ok(f(&mut guard))
    }

    /// Sends `frame` to every connection in play, this one included.
    ///
    /// Returns how many connections accepted it.
    pub fn broadcast(&mut self, frame: &RawFrame) -> usize {
        self.guard.release();
        let mut delivered = 0;
        for conn in self.dispatcher.registry.snapshot() {
            if conn.state() == ConnectionState::Play && conn.send(frame.clone()).is_ok() {
                global_metrics().frame_sent(frame.encoded_len() as u64);
                delivered += 1;
            }
        }
        delivered
    }

    /// Sends a disconnect packet with `reason` and closes this connection.
    pub fn disconnect(&mut self, reason: &str) {
        self.guard.release();
        disconnect_with_reason(self.conn, reason);
    }

    /// Closes this connection without a reason packet.
    pub fn close(&self) {
        self.conn.close();
    }
}

impl std::fmt::Debug for HandlerContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("conn_id", &self.conn.id())
            .field("access", &self.guard.access())
            .finish()
    }
}
