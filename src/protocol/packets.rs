//! # Serverbound Packet Tables
//!
//! One [`PacketTable`] per supported protocol version maps
//! `(ConnectionState, packet id)` to a [`PacketSpec`]: a name for logging and
//! a decoder that turns the payload into an [`Event`].
//!
//! Tables are built once and selected by the version a client announced in
//! its handshake. Unknown versions fall back to [`DEFAULT_PROTOCOL_VERSION`].
//!
//! Entries without a decoder carry data this layer does not model (item
//! slots, NBT, recipe ids). They still decode, to [`Opaque`], so a client that
//! sends them is not disconnected.

use bytes::Bytes;
use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::core::wire::{PacketReader, StringPolicy};
use crate::error::{ProtocolError, Result};
use crate::protocol::events::*;
use crate::protocol::state::ConnectionState;

/// Protocol version used when a client announces one without a table (1.12.2).
pub const DEFAULT_PROTOCOL_VERSION: i32 = 340;

/// Longest server address accepted in a handshake.
pub const SERVER_ADDRESS_POLICY: StringPolicy = StringPolicy::bytes(255);
/// Player names are at most 16 characters, all ASCII.
pub const PLAYER_NAME_POLICY: StringPolicy = StringPolicy::bytes(16);
/// 256 characters of up to four UTF-8 bytes each.
pub const CHAT_INPUT_POLICY: StringPolicy = StringPolicy::bytes(1024);

const LOCALE_POLICY: StringPolicy = StringPolicy::bytes(16);
const CHANNEL_POLICY: StringPolicy = StringPolicy::bytes(20);
const SIGN_LINE_POLICY: StringPolicy = StringPolicy::bytes(384 * 4);
const MAX_PLUGIN_PAYLOAD: usize = 32_767;
const MAX_ENCRYPTION_FIELD: usize = 1024;

pub type DecodeFn = fn(&mut PacketReader) -> Result<Event>;

/// One row of a packet table.
#[derive(Debug, Clone, Copy)]
pub struct PacketSpec {
    pub id: i32,
    pub name: &'static str,
    decoder: Option<DecodeFn>,
}

impl PacketSpec {
    /// Decodes `payload` into this packet's event.
    ///
    /// A payload shorter than the packet's fields fails with
    /// [`ProtocolError::InvalidLength`].
    pub fn decode(&self, payload: Bytes) -> Result<Event> {
        match self.decoder {
            Some(decoder) => decoder(&mut PacketReader::new(payload)),
            None => Ok(Event::Opaque(Opaque {
                packet_id: self.id,
                name: self.name,
                payload,
            })),
        }
    }

    pub fn is_opaque(&self) -> bool {
        self.decoder.is_none()
    }
}

/// Serverbound packet ids for every state of one protocol version.
#[derive(Debug)]
pub struct PacketTable {
    version: i32,
    states: [HashMap<i32, PacketSpec>; 4],
}

impl PacketTable {
    fn new(version: i32) -> Self {
        Self {
            version,
            states: Default::default(),
        }
    }

    fn entry(
        &mut self,
        state: ConnectionState,
        id: i32,
        name: &'static str,
        decoder: Option<DecodeFn>,
    ) -> &mut Self {
        if let Some(slot) = slot(state) {
            self.states[slot].insert(id, PacketSpec { id, name, decoder });
        }
        self
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Looks up `id` in the table for `state`.
    ///
    /// # Errors
    /// - [`ProtocolError::InvalidState`] if `state` has no table (`Closed`)
    /// - [`ProtocolError::InvalidPacket`] if the state's table has no such id
    pub fn lookup(&self, state: ConnectionState, id: i32) -> Result<&PacketSpec> {
        let slot = slot(state).ok_or(ProtocolError::InvalidState(state.id()))?;
        self.states[slot]
            .get(&id)
            .ok_or(ProtocolError::InvalidPacket { state, id })
    }

    /// Number of ids registered for `state`.
    pub fn len(&self, state: ConnectionState) -> usize {
        slot(state).map_or(0, |slot| self.states[slot].len())
    }
}

fn slot(state: ConnectionState) -> Option<usize> {
    match state {
        ConnectionState::Handshaking => Some(0),
        ConnectionState::Status => Some(1),
        ConnectionState::Login => Some(2),
        ConnectionState::Play => Some(3),
        ConnectionState::Closed => None,
    }
}

static V340: Lazy<PacketTable> = Lazy::new(build_v340);

static TABLES: Lazy<HashMap<i32, &'static PacketTable>> = Lazy::new(|| {
    let mut tables = HashMap::new();
    tables.insert(V340.version(), &*V340);
    tables
});

/// The table for `protocol_version`, or the default table if that version is unknown.
pub fn table_for(protocol_version: i32) -> &'static PacketTable {
    TABLES.get(&protocol_version).copied().unwrap_or(&*V340)
}

/// Whether a dedicated table exists for `protocol_version`.
pub fn is_supported(protocol_version: i32) -> bool {
    TABLES.contains_key(&protocol_version)
}

fn build_v340() -> PacketTable {
    use ConnectionState::*;

    let mut t = PacketTable::new(340);
    t.entry(Handshaking, 0x00, "handshake", Some(decode_handshake));

    t.entry(Status, 0x00, "status_request", Some(decode_status_request))
        .entry(Status, 0x01, "status_ping", Some(decode_status_ping));

    t.entry(Login, 0x00, "login_start", Some(decode_login_start))
        .entry(Login, 0x01, "encryption_response", Some(decode_encryption_response));

    t.entry(Play, 0x00, "teleport_confirm", Some(decode_teleport_confirm))
        .entry(Play, 0x01, "tab_complete", Some(decode_tab_complete))
        .entry(Play, 0x02, "chat_message", Some(decode_chat))
        .entry(Play, 0x03, "client_status", Some(decode_client_status))
        .entry(Play, 0x04, "client_settings", Some(decode_client_settings))
        .entry(Play, 0x05, "confirm_transaction", Some(decode_confirm_transaction))
        .entry(Play, 0x06, "enchant_item", None)
        .entry(Play, 0x07, "click_window", None)
        .entry(Play, 0x08, "close_window", Some(decode_close_window))
        .entry(Play, 0x09, "plugin_message", Some(decode_plugin_message))
        .entry(Play, 0x0A, "use_entity", Some(decode_use_entity))
        .entry(Play, 0x0B, "keep_alive", Some(decode_keep_alive))
        .entry(Play, 0x0C, "player", Some(decode_player))
        .entry(Play, 0x0D, "player_position", Some(decode_position))
        .entry(Play, 0x0E, "player_position_and_look", Some(decode_position_and_look))
        .entry(Play, 0x0F, "player_look", Some(decode_look))
        .entry(Play, 0x10, "vehicle_move", None)
        .entry(Play, 0x11, "steer_boat", None)
        .entry(Play, 0x12, "craft_recipe_request", None)
        .entry(Play, 0x13, "player_abilities", Some(decode_abilities))
        .entry(Play, 0x14, "player_digging", Some(decode_digging))
        .entry(Play, 0x15, "entity_action", Some(decode_entity_action))
        .entry(Play, 0x16, "steer_vehicle", None)
        .entry(Play, 0x17, "crafting_book_data", None)
        .entry(Play, 0x18, "resource_pack_status", Some(decode_resource_pack_status))
        .entry(Play, 0x19, "advancement_tab", None)
        .entry(Play, 0x1A, "held_item_change", Some(decode_held_item_change))
        .entry(Play, 0x1B, "creative_inventory_action", None)
        .entry(Play, 0x1C, "update_sign", Some(decode_update_sign))
        .entry(Play, 0x1D, "animation", Some(decode_animation))
        .entry(Play, 0x1E, "spectate", Some(decode_spectate))
        .entry(Play, 0x1F, "player_block_placement", Some(decode_block_placement))
        .entry(Play, 0x20, "use_item", Some(decode_use_item));
    t
}

// --- decoders --------------------------------------------------------------

fn decode_handshake(r: &mut PacketReader) -> Result<Event> {
    Ok(Handshake {
        protocol_version: r.read_varint()?,
        server_address: r.read_string(SERVER_ADDRESS_POLICY)?,
        server_port: r.read_u16()?,
        next_state: r.read_varint()?,
    }
    .into())
}

fn decode_status_request(_: &mut PacketReader) -> Result<Event> {
    Ok(StatusRequest.into())
}

fn decode_status_ping(r: &mut PacketReader) -> Result<Event> {
    Ok(StatusPing {
        payload: r.read_i64()?,
    }
    .into())
}

fn decode_login_start(r: &mut PacketReader) -> Result<Event> {
    Ok(LoginStart {
        name: r.read_string(PLAYER_NAME_POLICY)?,
    }
    .into())
}

fn decode_encryption_response(r: &mut PacketReader) -> Result<Event> {
    Ok(EncryptionResponse {
        shared_secret: r.read_byte_array(MAX_ENCRYPTION_FIELD)?,
        verify_token: r.read_byte_array(MAX_ENCRYPTION_FIELD)?,
    }
    .into())
}

fn decode_teleport_confirm(r: &mut PacketReader) -> Result<Event> {
    Ok(TeleportConfirm {
        teleport_id: r.read_varint()?,
    }
    .into())
}

fn decode_tab_complete(r: &mut PacketReader) -> Result<Event> {
    let text = r.read_string(StringPolicy::SHORT)?;
    let assume_command = r.read_bool()?;
    let looked_at = if r.read_bool()? {
        Some(r.read_position()?)
    } else {
        None
    };
    Ok(TabComplete {
        text,
        assume_command,
        looked_at,
    }
    .into())
}

fn decode_chat(r: &mut PacketReader) -> Result<Event> {
    Ok(ChatMessage {
        message: r.read_string(CHAT_INPUT_POLICY)?,
    }
    .into())
}

fn decode_client_status(r: &mut PacketReader) -> Result<Event> {
    Ok(ClientStatus {
        action: r.read_varint()?,
    }
    .into())
}

fn decode_client_settings(r: &mut PacketReader) -> Result<Event> {
    Ok(ClientSettings {
        locale: r.read_string(LOCALE_POLICY)?,
        view_distance: r.read_i8()?,
        chat_mode: r.read_varint()?,
        chat_colors: r.read_bool()?,
        skin_parts: r.read_u8()?,
        main_hand: r.read_varint()?,
    }
    .into())
}

fn decode_confirm_transaction(r: &mut PacketReader) -> Result<Event> {
    Ok(ConfirmTransaction {
        window_id: r.read_i8()?,
        action_number: r.read_i16()?,
        accepted: r.read_bool()?,
    }
    .into())
}

fn decode_close_window(r: &mut PacketReader) -> Result<Event> {
    Ok(CloseWindow {
        window_id: r.read_u8()?,
    }
    .into())
}

fn decode_plugin_message(r: &mut PacketReader) -> Result<Event> {
    let channel = r.read_string(CHANNEL_POLICY)?;
    let data = r.read_remaining();
    if data.len() > MAX_PLUGIN_PAYLOAD {
        return Err(ProtocolError::OversizedPacket(data.len()));
    }
    Ok(PluginMessage { channel, data }.into())
}

fn decode_use_entity(r: &mut PacketReader) -> Result<Event> {
    let target = r.read_varint()?;
    let action = match r.read_varint()? {
        0 => UseEntityAction::Interact {
            hand: r.read_varint()?,
        },
        1 => UseEntityAction::Attack,
        2 => {
            let (x, y, z) = (r.read_f32()?, r.read_f32()?, r.read_f32()?);
            UseEntityAction::InteractAt {
                x,
                y,
                z,
                hand: r.read_varint()?,
            }
        }
        other => {
            return Err(ProtocolError::Custom(format!(
                "unknown use-entity action {other}"
            )))
        }
    };
    Ok(UseEntity { target, action }.into())
}

fn decode_keep_alive(r: &mut PacketReader) -> Result<Event> {
    Ok(KeepAlive { id: r.read_i64()? }.into())
}

fn decode_player(r: &mut PacketReader) -> Result<Event> {
    Ok(PlayerOnGround {
        on_ground: r.read_bool()?,
    }
    .into())
}

fn decode_position(r: &mut PacketReader) -> Result<Event> {
    Ok(PlayerPosition {
        x: r.read_f64()?,
        y: r.read_f64()?,
        z: r.read_f64()?,
        on_ground: r.read_bool()?,
    }
    .into())
}

fn decode_position_and_look(r: &mut PacketReader) -> Result<Event> {
    Ok(PlayerPositionAndLook {
        x: r.read_f64()?,
        y: r.read_f64()?,
        z: r.read_f64()?,
        yaw: r.read_f32()?,
        pitch: r.read_f32()?,
        on_ground: r.read_bool()?,
    }
    .into())
}

fn decode_look(r: &mut PacketReader) -> Result<Event> {
    Ok(PlayerLook {
        yaw: r.read_f32()?,
        pitch: r.read_f32()?,
        on_ground: r.read_bool()?,
    }
    .into())
}

fn decode_abilities(r: &mut PacketReader) -> Result<Event> {
    Ok(PlayerAbilities {
        flags: r.read_i8()?,
        flying_speed: r.read_f32()?,
        walking_speed: r.read_f32()?,
    }
    .into())
}

fn decode_digging(r: &mut PacketReader) -> Result<Event> {
    Ok(PlayerDigging {
        status: r.read_varint()?,
        location: r.read_position()?,
        face: r.read_i8()?,
    }
    .into())
}

fn decode_entity_action(r: &mut PacketReader) -> Result<Event> {
    Ok(EntityAction {
        entity_id: r.read_varint()?,
        action: r.read_varint()?,
        jump_boost: r.read_varint()?,
    }
    .into())
}

fn decode_resource_pack_status(r: &mut PacketReader) -> Result<Event> {
    Ok(ResourcePackStatus {
        result: r.read_varint()?,
    }
    .into())
}

fn decode_held_item_change(r: &mut PacketReader) -> Result<Event> {
    Ok(HeldItemChange {
        slot: r.read_i16()?,
    }
    .into())
}

fn decode_update_sign(r: &mut PacketReader) -> Result<Event> {
    let location = r.read_position()?;
    let lines = [
        r.read_string(SIGN_LINE_POLICY)?,
        r.read_string(SIGN_LINE_POLICY)?,
        r.read_string(SIGN_LINE_POLICY)?,
        r.read_string(SIGN_LINE_POLICY)?,
    ];
    Ok(UpdateSign { location, lines }.into())
}

fn decode_animation(r: &mut PacketReader) -> Result<Event> {
    Ok(Animation {
        hand: r.read_varint()?,
    }
    .into())
}

fn decode_spectate(r: &mut PacketReader) -> Result<Event> {
    Ok(Spectate {
        target: r.read_uuid()?,
    }
    .into())
}

fn decode_block_placement(r: &mut PacketReader) -> Result<Event> {
    Ok(BlockPlacement {
        location: r.read_position()?,
        face: r.read_varint()?,
        hand: r.read_varint()?,
        cursor: [r.read_f32()?, r.read_f32()?, r.read_f32()?],
    }
    .into())
}

fn decode_use_item(r: &mut PacketReader) -> Result<Event> {
    Ok(UseItem {
        hand: r.read_varint()?,
    }
    .into())
}
