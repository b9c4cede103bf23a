//! Typed events decoded from serverbound packets.
//!
//! Every packet-table entry produces exactly one [`Event`]. Game logic
//! subscribes to an [`EventKind`] on the dispatcher and receives the decoded
//! value along with a handle to the originating connection.

use bytes::Bytes;
use uuid::Uuid;

use crate::core::wire::Position;

/// Declares the event payload types as variants of [`Event`] and [`EventKind`].
macro_rules! events {
    ($($variant:ident),* $(,)?) => {
        /// A decoded serverbound packet.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Event {
            $($variant($variant),)*
        }

        /// Discriminant of [`Event`], used as the callback routing key.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EventKind {
            $($variant,)*
        }

        impl Event {
            pub fn kind(&self) -> EventKind {
                match self {
                    $(Event::$variant(_) => EventKind::$variant,)*
                }
            }
        }

        $(
            impl From<$variant> for Event {
                fn from(value: $variant) -> Self {
                    Event::$variant(value)
                }
            }
        )*
    };
}

events! {
    Handshake,
    StatusRequest,
    StatusPing,
    LoginStart,
    EncryptionResponse,
    LoginComplete,
    TeleportConfirm,
    TabComplete,
    ChatMessage,
    ClientStatus,
    ClientSettings,
    ConfirmTransaction,
    CloseWindow,
    PluginMessage,
    UseEntity,
    KeepAlive,
    PlayerOnGround,
    PlayerPosition,
    PlayerPositionAndLook,
    PlayerLook,
    PlayerAbilities,
    PlayerDigging,
    EntityAction,
    ResourcePackStatus,
    HeldItemChange,
    UpdateSign,
    Animation,
    Spectate,
    BlockPlacement,
    UseItem,
    Opaque,
}

// --- handshaking -----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: i32,
}

// --- status ----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPing {
    pub payload: i64,
}

// --- login -----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginStart {
    pub name: String,
}

/// Accepted and logged; no key exchange is performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionResponse {
    pub shared_secret: Bytes,
    pub verify_token: Bytes,
}

/// Raised by the server itself once login succeeds and the connection is in play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginComplete {
    pub name: String,
    pub uuid: Uuid,
}

// --- play ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeleportConfirm {
    pub teleport_id: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabComplete {
    pub text: String,
    pub assume_command: bool,
    pub looked_at: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStatus {
    /// 0 = perform respawn, 1 = request stats
    pub action: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub locale: String,
    pub view_distance: i8,
    pub chat_mode: i32,
    pub chat_colors: bool,
    pub skin_parts: u8,
    pub main_hand: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmTransaction {
    pub window_id: i8,
    pub action_number: i16,
    pub accepted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseWindow {
    pub window_id: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMessage {
    pub channel: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UseEntityAction {
    Interact { hand: i32 },
    Attack,
    InteractAt { x: f32, y: f32, z: f32, hand: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UseEntity {
    pub target: i32,
    pub action: UseEntityAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    pub id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerOnGround {
    pub on_ground: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub on_ground: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPositionAndLook {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerLook {
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerAbilities {
    pub flags: i8,
    pub flying_speed: f32,
    pub walking_speed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerDigging {
    pub status: i32,
    pub location: Position,
    pub face: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityAction {
    pub entity_id: i32,
    pub action: i32,
    pub jump_boost: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourcePackStatus {
    pub result: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeldItemChange {
    pub slot: i16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSign {
    pub location: Position,
    pub lines: [String; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Animation {
    pub hand: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spectate {
    pub target: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockPlacement {
    pub location: Position,
    pub face: i32,
    pub hand: i32,
    pub cursor: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UseItem {
    pub hand: i32,
}

/// A recognised packet whose payload depends on data this layer does not model
/// (item slots, NBT, recipes). The raw payload is passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opaque {
    pub packet_id: i32,
    pub name: &'static str,
    pub payload: Bytes,
}
