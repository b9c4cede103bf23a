//! Built-in handling for the packets the protocol layer owns.
//!
//! State transitions (handshake, login), the status exchange, and the record
//! fields every server keeps (position, settings, keep-alive) are applied here
//! before game-logic callbacks see the event.

use std::time::Instant;
use tracing::{debug, info};

use crate::error::{constants, Result};
use crate::protocol::clientbound;
use crate::protocol::dispatcher::HandlerContext;
use crate::protocol::events::{Event, LoginComplete};
use crate::protocol::state::ConnectionState;

/// Longest accepted player name, in characters.
pub const MAX_NAME_LENGTH: usize = 16;

/// Whether `name` is 1 to 16 ASCII letters, digits or underscores.
pub fn is_valid_player_name(name: &str) -> bool {
    (1..=MAX_NAME_LENGTH).contains(&name.len())
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Applies `event` to the connection. May return an event raised by the
/// server itself (login completion) to dispatch after the original one.
pub(crate) fn apply(ctx: &mut HandlerContext<'_>, event: &Event) -> Result<Option<Event>> {
    match event {
        Event::Handshake(h) => {
            let next = ConnectionState::after_handshake(h.next_state);
            let record = ctx.record_mut();
            record.state = record.state.transition(next)?;
            record.protocol_version = h.protocol_version;
            record.server_address = h.server_address.clone();
            record.server_port = h.server_port;
            ctx.downgrade();
            debug!(
                conn_id = ctx.id(),
                protocol_version = h.protocol_version,
                next_state = %next,
                "Handshake"
            );
        }

        Event::StatusRequest(_) => {
            let dispatcher = ctx.dispatcher();
            let frame =
                clientbound::status_response(dispatcher.status(), dispatcher.players_online())?;
            ctx.send(frame)?;
        }

        Event::StatusPing(ping) => {
            ctx.send(clientbound::pong(ping.payload))?;
            // the status exchange is over
            ctx.close();
        }

        Event::LoginStart(login) => return login_start(ctx, &login.name),

        Event::EncryptionResponse(response) => {
            debug!(
                conn_id = ctx.id(),
                secret_len = response.shared_secret.len(),
                "Encryption response ignored; encryption is not supported"
            );
        }

        Event::KeepAlive(keep_alive) => {
            let now = Instant::now();
            let record = ctx.record_mut();
            if record.liveness.pending_keep_alive == Some(keep_alive.id) {
                record.liveness.pending_keep_alive = None;
                record.liveness.last_keep_alive = Some(now);
            } else {
                debug!(conn_id = ctx.id(), id = keep_alive.id, "Unexpected keep-alive id");
            }
        }

        Event::PlayerOnGround(p) => {
            ctx.record_mut().position.on_ground = p.on_ground;
        }

        Event::PlayerPosition(p) => {
            let position = &mut ctx.record_mut().position;
            position.x = p.x;
            position.y = p.y;
            position.z = p.z;
            position.on_ground = p.on_ground;
        }

        Event::PlayerPositionAndLook(p) => {
            let position = &mut ctx.record_mut().position;
            position.x = p.x;
            position.y = p.y;
            position.z = p.z;
            position.yaw = p.yaw;
            position.pitch = p.pitch;
            position.on_ground = p.on_ground;
        }

        Event::PlayerLook(p) => {
            let position = &mut ctx.record_mut().position;
            position.yaw = p.yaw;
            position.pitch = p.pitch;
            position.on_ground = p.on_ground;
        }

        Event::ClientSettings(settings) => {
            ctx.record_mut().settings = Some(settings.clone());
        }

        Event::HeldItemChange(change) => {
            if (0..=8).contains(&change.slot) {
                ctx.record_mut().held_slot = change.slot;
            } else {
                debug!(conn_id = ctx.id(), slot = change.slot, "Held slot out of range");
            }
        }

        _ => {}
    }

    // Callbacks start from shared access at most.
    ctx.downgrade();
    Ok(None)
}

fn login_start(ctx: &mut HandlerContext<'_>, name: &str) -> Result<Option<Event>> {
    if !is_valid_player_name(name) {
        debug!(conn_id = ctx.id(), name, "Rejecting login");
        ctx.disconnect(constants::ERR_INVALID_NAME);
        return Ok(None);
    }

    let uuid = ctx.dispatcher().identity().identify(name);
    {
        let record = ctx.record_mut();
        record.state = record.state.transition(ConnectionState::Play)?;
        record.name = Some(name.to_string());
        record.uuid = Some(uuid);
        record.liveness.last_keep_alive = Some(Instant::now());
        // counted together with the transition; leaving Play uncounts it
        ctx.dispatcher().player_joined();
    }
    ctx.downgrade();

    ctx.send(clientbound::login_success(uuid, name)?)?;
    info!(conn_id = ctx.id(), peer = %ctx.connection().peer(), name, %uuid, "Player logged in");

    Ok(Some(
        LoginComplete {
            name: name.to_string(),
            uuid,
        }
        .into(),
    ))
}
