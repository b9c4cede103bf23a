//! Outbound payloads the protocol layer sends on its own.
//!
//! Every function returns a [`RawFrame`]; framing (the length prefix) happens
//! in the connection's writer. Game packets beyond these are the caller's to
//! encode with [`PacketWriter`].

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use uuid::Uuid;

use crate::core::frame::RawFrame;
use crate::core::wire::{PacketWriter, StringPolicy};
use crate::error::Result;

/// Clientbound packet ids for protocol 340.
pub mod ids {
    pub const STATUS_RESPONSE: i32 = 0x00;
    pub const STATUS_PONG: i32 = 0x01;

    pub const LOGIN_DISCONNECT: i32 = 0x00;
    pub const LOGIN_SUCCESS: i32 = 0x02;

    pub const PLAY_CHAT_MESSAGE: i32 = 0x0F;
    pub const PLAY_DISCONNECT: i32 = 0x1A;
    pub const PLAY_KEEP_ALIVE: i32 = 0x1F;
}

/// Byte that opens the legacy kick reply.
pub const LEGACY_KICK_ID: u8 = 0xFF;

/// What the server reports in the server list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusInfo {
    pub version_name: String,
    pub protocol_version: i32,
    pub motd: String,
    pub max_players: u32,
}

impl Default for StatusInfo {
    fn default() -> Self {
        Self {
            version_name: "1.12.2".to_string(),
            protocol_version: 340,
            motd: "A Minecraft Server".to_string(),
            max_players: 20,
        }
    }
}

#[derive(Serialize)]
struct StatusJson<'a> {
    version: VersionJson<'a>,
    players: PlayersJson,
    description: ChatJson<'a>,
}

#[derive(Serialize)]
struct VersionJson<'a> {
    name: &'a str,
    protocol: i32,
}

#[derive(Serialize)]
struct PlayersJson {
    max: u32,
    online: usize,
}

#[derive(Serialize)]
struct ChatJson<'a> {
    text: &'a str,
}

/// Where a chat message is shown on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum ChatPosition {
    Chat = 0,
    System = 1,
    ActionBar = 2,
}

/// Wraps plain text as a JSON chat component.
pub fn chat_component(text: &str) -> Result<String> {
    Ok(serde_json::to_string(&ChatJson { text })?)
}

/// JSON body of the status response.
pub fn status_json(info: &StatusInfo, online: usize) -> Result<String> {
    let body = StatusJson {
        version: VersionJson {
            name: &info.version_name,
            protocol: info.protocol_version,
        },
        players: PlayersJson {
            max: info.max_players,
            online,
        },
        description: ChatJson { text: &info.motd },
    };
    Ok(serde_json::to_string(&body)?)
}

pub fn status_response(info: &StatusInfo, online: usize) -> Result<RawFrame> {
    let json = status_json(info, online)?;
    let mut w = PacketWriter::with_capacity(json.len() + 3);
    w.write_str(&json, StringPolicy::SHORT)?;
    Ok(RawFrame::new(ids::STATUS_RESPONSE, w.finish()))
}

pub fn pong(payload: i64) -> RawFrame {
    let mut w = PacketWriter::with_capacity(8);
    w.write_i64(payload);
    RawFrame::new(ids::STATUS_PONG, w.finish())
}

/// Login success carries the UUID in its hyphenated text form.
pub fn login_success(uuid: Uuid, name: &str) -> Result<RawFrame> {
    let mut w = PacketWriter::new();
    w.write_str(&uuid.hyphenated().to_string(), StringPolicy::bytes(36))?
        .write_str(name, StringPolicy::bytes(16))?;
    Ok(RawFrame::new(ids::LOGIN_SUCCESS, w.finish()))
}

pub fn login_disconnect(reason: &str) -> Result<RawFrame> {
    disconnect_frame(ids::LOGIN_DISCONNECT, reason)
}

pub fn play_disconnect(reason: &str) -> Result<RawFrame> {
    disconnect_frame(ids::PLAY_DISCONNECT, reason)
}

fn disconnect_frame(id: i32, reason: &str) -> Result<RawFrame> {
    let mut w = PacketWriter::new();
    w.write_str(&chat_component(reason)?, StringPolicy::CHAT)?;
    Ok(RawFrame::new(id, w.finish()))
}

pub fn keep_alive(id: i64) -> RawFrame {
    let mut w = PacketWriter::with_capacity(8);
    w.write_i64(id);
    RawFrame::new(ids::PLAY_KEEP_ALIVE, w.finish())
}

pub fn chat_message(text: &str, position: ChatPosition) -> Result<RawFrame> {
    let mut w = PacketWriter::new();
    w.write_str(&chat_component(text)?, StringPolicy::CHAT)?
        .write_i8(position as i8);
    Ok(RawFrame::new(ids::PLAY_CHAT_MESSAGE, w.finish()))
}

/// Reply to a legacy server list ping. Written raw, without a frame header.
///
/// ```text
/// [0xFF] [u16 length in UTF-16 units] [UTF-16BE "§1\0proto\0version\0motd\0online\0max"]
/// ```
pub fn legacy_kick(info: &StatusInfo, online: usize) -> Bytes {
    let text = format!(
        "§1\0{}\0{}\0{}\0{}\0{}",
        info.protocol_version, info.version_name, info.motd, online, info.max_players
    );
    let units: Vec<u16> = text.encode_utf16().collect();

    let mut buf = BytesMut::with_capacity(3 + units.len() * 2);
    buf.put_u8(LEGACY_KICK_ID);
    buf.put_u16(units.len() as u16);
    for unit in units {
        buf.put_u16(unit);
    }
    buf.freeze()
}
