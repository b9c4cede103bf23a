// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::connection::lock::Access;
use crate::connection::record::{Connection, Outbound};
use crate::connection::registry::ConnectionRegistry;
use crate::core::frame::RawFrame;
use crate::core::wire::{PacketReader, PacketWriter, StringPolicy};
use crate::error::ProtocolError;
use crate::protocol::clientbound::ids;
use crate::protocol::dispatcher::{Dispatcher, ErrorAction};
use crate::protocol::events::{Event, EventKind};
use crate::protocol::state::ConnectionState;

struct Harness {
    registry: Arc<ConnectionRegistry>,
    dispatcher: Dispatcher,
}

impl Harness {
    fn new() -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        Self {
            registry,
            dispatcher,
        }
    }

    fn connect(&self) -> (Arc<Connection>, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Connection::new(
            self.registry.next_id(),
            "127.0.0.1:40000".parse().unwrap(),
            tx,
        ));
        self.registry.insert(Arc::clone(&conn));
        (conn, rx)
    }

    fn handshake(&self, conn: &Arc<Connection>, next_state: i32) {
        let mut w = PacketWriter::new();
        w.write_varint(340);
        w.write_str("localhost", StringPolicy::SHORT).unwrap();
        w.write_bytes(&25565u16.to_be_bytes()).write_varint(next_state);
        self.dispatcher
            .dispatch(conn, RawFrame::new(0x00, w.finish()))
            .unwrap();
    }

    fn login(&self, conn: &Arc<Connection>, name: &str) {
        self.handshake(conn, 2);
        let mut w = PacketWriter::new();
        w.write_str(name, StringPolicy::SHORT).unwrap();
        self.dispatcher.handle_frame(conn, RawFrame::new(0x00, w.finish()));
    }
}

fn frames(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        out.push(item);
    }
    out
}

#[test]
fn test_handshake_selects_status_or_login() {
    let h = Harness::new();
    let (status, _rx1) = h.connect();
    let (login, _rx2) = h.connect();

    h.handshake(&status, 1);
    h.handshake(&login, 2);

    assert_eq!(status.state(), ConnectionState::Status);
    assert_eq!(login.state(), ConnectionState::Login);
    let record = login.lock().read();
    assert_eq!(record.protocol_version, 340);
    assert_eq!(record.server_address, "localhost");
    assert_eq!(record.server_port, 25565);
}

#[test]
fn test_play_packet_while_handshaking_is_invalid_packet() {
    let h = Harness::new();
    let (conn, _rx) = h.connect();

    let err = h
        .dispatcher
        .dispatch(&conn, RawFrame::new(0x0B, vec![0; 8]))
        .unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::InvalidPacket {
            state: ConnectionState::Handshaking,
            id: 0x0B
        }
    ));
    assert_eq!(conn.state(), ConnectionState::Handshaking);
}

#[test]
fn test_truncated_payload_is_invalid_length() {
    let h = Harness::new();
    let (conn, _rx) = h.connect();
    // handshake with only the protocol version
    let err = h
        .dispatcher
        .dispatch(&conn, RawFrame::new(0x00, vec![0xD4, 0x02]))
        .unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidLength { .. }));
    assert_eq!(conn.state(), ConnectionState::Handshaking);
}

#[test]
fn test_closed_connection_is_invalid_state() {
    let h = Harness::new();
    let (conn, _rx) = h.connect();
    h.dispatcher.connection_closed(&conn);
    let err = h
        .dispatcher
        .dispatch(&conn, RawFrame::new(0x00, Bytes::new()))
        .unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidState(-1)));
}

#[test]
fn test_status_request_and_ping() {
    let h = Harness::new();
    let (conn, mut rx) = h.connect();
    h.handshake(&conn, 1);

    h.dispatcher.handle_frame(&conn, RawFrame::new(0x00, Bytes::new()));
    h.dispatcher
        .handle_frame(&conn, RawFrame::new(0x01, 1234i64.to_be_bytes().to_vec()));

    let out = frames(&mut rx);
    assert_eq!(out.len(), 3);
    match &out[0] {
        Outbound::Frame(frame) => {
            assert_eq!(frame.packet_id, ids::STATUS_RESPONSE);
            let json = PacketReader::new(frame.payload.clone())
                .read_string(StringPolicy::SHORT)
                .unwrap();
            assert!(json.contains("\"protocol\":340"));
        }
        other => panic!("expected status response, got {other:?}"),
    }
    assert_eq!(
        out[1],
        Outbound::Frame(RawFrame::new(ids::STATUS_PONG, 1234i64.to_be_bytes().to_vec()))
    );
    assert_eq!(out[2], Outbound::Close);
    assert!(conn.is_closed());
}

#[test]
fn test_login_moves_to_play_and_raises_login_complete() {
    let h = Harness::new();
    let completed = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&completed);
    h.dispatcher.on(EventKind::LoginComplete, move |ctx, event| {
        let Event::LoginComplete(done) = event else {
            panic!("wrong event");
        };
        assert_eq!(done.name, "Steve");
        assert_eq!(ctx.record().state, ConnectionState::Play);
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let (conn, mut rx) = h.connect();
    h.login(&conn, "Steve");

    assert_eq!(conn.state(), ConnectionState::Play);
    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert_eq!(h.dispatcher.players_online(), 1);

    let record = conn.lock().read().clone();
    assert_eq!(record.name.as_deref(), Some("Steve"));
    assert_eq!(
        record.uuid,
        Some(h.dispatcher.identity().identify("Steve"))
    );

    let out = frames(&mut rx);
    assert!(matches!(&out[0], Outbound::Frame(f) if f.packet_id == ids::LOGIN_SUCCESS));

    h.dispatcher.connection_closed(&conn);
    assert_eq!(h.dispatcher.players_online(), 0);
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[test]
fn test_login_with_writer_gone_keeps_player_count_balanced() {
    let h = Harness::new();
    let (alice, _alice_rx) = h.connect();
    h.login(&alice, "Alice");
    assert_eq!(h.dispatcher.players_online(), 1);

    let (bob, bob_rx) = h.connect();
    h.handshake(&bob, 2);
    drop(bob_rx);
    let mut w = PacketWriter::new();
    w.write_str("Bob", StringPolicy::SHORT).unwrap();
    let err = h
        .dispatcher
        .dispatch(&bob, RawFrame::new(0x00, w.finish()))
        .unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));
    assert_eq!(bob.state(), ConnectionState::Play);

    h.dispatcher.connection_closed(&bob);
    assert_eq!(h.dispatcher.players_online(), 1);

    h.dispatcher.connection_closed(&alice);
    assert_eq!(h.dispatcher.players_online(), 0);
}

#[test]
fn test_invalid_name_gets_login_disconnect() {
    let h = Harness::new();
    let (conn, mut rx) = h.connect();
    h.login(&conn, "no spaces");

    let out = frames(&mut rx);
    assert!(matches!(&out[0], Outbound::Frame(f) if f.packet_id == ids::LOGIN_DISCONNECT));
    assert_eq!(out[1], Outbound::Close);
    assert_eq!(conn.state(), ConnectionState::Login);
}

#[test]
fn test_custom_identity_provider() {
    let registry = Arc::new(ConnectionRegistry::new());
    let dispatcher = Dispatcher::new(Arc::clone(&registry))
        .with_identity(Arc::new(|_: &str| Uuid::from_u128(42)));
    let h = Harness {
        registry,
        dispatcher,
    };
    let (conn, _rx) = h.connect();
    h.login(&conn, "Alex");
    assert_eq!(conn.lock().read().uuid, Some(Uuid::from_u128(42)));
}

#[test]
fn test_movement_updates_record() {
    let h = Harness::new();
    let (conn, _rx) = h.connect();
    h.login(&conn, "Mover");

    let mut w = PacketWriter::new();
    w.write_f64(1.0)
        .write_f64(64.0)
        .write_f64(-3.5)
        .write_f32(90.0)
        .write_f32(10.0)
        .write_bool(true);
    h.dispatcher
        .dispatch(&conn, RawFrame::new(0x0E, w.finish()))
        .unwrap();

    let position = conn.lock().read().position;
    assert_eq!((position.x, position.y, position.z), (1.0, 64.0, -3.5));
    assert_eq!((position.yaw, position.pitch), (90.0, 10.0));
    assert!(position.on_ground);
}

#[test]
fn test_keep_alive_refreshes_only_on_matching_id() {
    let h = Harness::new();
    let (conn, _rx) = h.connect();
    h.login(&conn, "Alive");

    let before = conn.lock().read().liveness.last_keep_alive;
    conn.guard().write().liveness.pending_keep_alive = Some(77);

    h.dispatcher
        .dispatch(&conn, RawFrame::new(0x0B, 5i64.to_be_bytes().to_vec()))
        .unwrap();
    assert_eq!(conn.lock().read().liveness.pending_keep_alive, Some(77));

    h.dispatcher
        .dispatch(&conn, RawFrame::new(0x0B, 77i64.to_be_bytes().to_vec()))
        .unwrap();
    let liveness = conn.lock().read().liveness.clone();
    assert_eq!(liveness.pending_keep_alive, None);
    assert!(liveness.last_keep_alive >= before);
}

#[test]
fn test_callbacks_get_shared_access_and_can_upgrade() {
    let h = Harness::new();
    h.dispatcher.on(EventKind::ChatMessage, |ctx, event| {
        assert_ne!(ctx.access(), Access::Exclusive);
        if let Event::ChatMessage(chat) = event {
            ctx.record_mut().name = Some(chat.message.clone());
        }
        assert_eq!(ctx.access(), Access::Exclusive);
        ctx.release();
        Ok(())
    });

    let (conn, _rx) = h.connect();
    h.login(&conn, "Talker");

    let mut w = PacketWriter::new();
    w.write_str("renamed", StringPolicy::SHORT).unwrap();
    h.dispatcher
        .dispatch(&conn, RawFrame::new(0x02, w.finish()))
        .unwrap();
    assert_eq!(conn.lock().read().name.as_deref(), Some("renamed"));
}

#[test]
fn test_broadcast_reaches_play_connections_only() {
    let h = Harness::new();
    let (a, mut rx_a) = h.connect();
    let (b, mut rx_b) = h.connect();
    let (_c, mut rx_c) = h.connect();
    h.login(&a, "Aaa");
    h.login(&b, "Bbb");
    frames(&mut rx_a);
    frames(&mut rx_b);

    h.dispatcher.on(EventKind::ChatMessage, |ctx, _| {
        let frame = RawFrame::new(ids::PLAY_CHAT_MESSAGE, Bytes::from_static(b"x"));
        assert_eq!(ctx.broadcast(&frame), 2);
        assert_eq!(ctx.access(), Access::Released);
        Ok(())
    });

    let mut w = PacketWriter::new();
    w.write_str("hi", StringPolicy::SHORT).unwrap();
    h.dispatcher
        .dispatch(&a, RawFrame::new(0x02, w.finish()))
        .unwrap();

    assert_eq!(frames(&mut rx_a).len(), 1);
    assert_eq!(frames(&mut rx_b).len(), 1);
    assert!(frames(&mut rx_c).is_empty());
}

#[test]
fn test_with_connection_releases_own_guard() {
    let h = Harness::new();
    let (a, _rx_a) = h.connect();
    let (b, _rx_b) = h.connect();
    let b_id = b.id();

    h.dispatcher.on(EventKind::Handshake, move |ctx, _| {
        ctx.record_mut();
        ctx.with_connection(b_id, |guard| {
            guard.write().held_slot = 4;
        })?;
        assert_eq!(ctx.access(), Access::Released);
        assert!(matches!(
            ctx.with_connection(9999, |_| ()),
            Err(ProtocolError::UnknownConnection(9999))
        ));
        Ok(())
    });

    h.handshake(&a, 2);
    assert_eq!(b.lock().read().held_slot, 4);
}

#[test]
fn test_error_policy_can_keep_connection() {
    let h = Harness::new();
    let errors = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&errors);
    h.dispatcher.on_error(move |_, _| {
        counted.fetch_add(1, Ordering::SeqCst);
        ErrorAction::Ignore
    });

    let (conn, mut rx) = h.connect();
    h.dispatcher.handle_frame(&conn, RawFrame::new(0x42, Bytes::new()));
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert!(!conn.is_closed());
    assert!(frames(&mut rx).is_empty());
}

#[test]
fn test_default_policy_disconnects_in_play() {
    let h = Harness::new();
    let (conn, mut rx) = h.connect();
    h.login(&conn, "Victim");
    frames(&mut rx);

    // 0x7F has no entry in the play table
    h.dispatcher.handle_frame(&conn, RawFrame::new(0x7F, Bytes::new()));
    let out = frames(&mut rx);
    assert!(matches!(&out[0], Outbound::Frame(f) if f.packet_id == ids::PLAY_DISCONNECT));
    assert_eq!(out[1], Outbound::Close);
    assert!(conn.is_closed());

    // frames arriving after the close are dropped silently
    h.dispatcher.handle_frame(&conn, RawFrame::new(0x7F, Bytes::new()));
    assert!(frames(&mut rx).is_empty());
}

#[test]
fn test_callback_error_goes_to_error_policy() {
    let h = Harness::new();
    h.dispatcher.on(EventKind::Handshake, |_, _| {
        Err(ProtocolError::Custom("rejected".into()))
    });
    let (conn, _rx) = h.connect();

    let mut w = PacketWriter::new();
    w.write_varint(340);
    w.write_str("localhost", StringPolicy::SHORT).unwrap();
    w.write_bytes(&25565u16.to_be_bytes()).write_varint(2);
    h.dispatcher.handle_frame(&conn, RawFrame::new(0x00, w.finish()));

    assert!(conn.is_closed());
    assert_eq!(h.dispatcher.handler_count(EventKind::Handshake), 1);
}
