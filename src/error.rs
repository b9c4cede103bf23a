//! # Error Types
//!
//! Error handling for the protocol engine.
//!
//! This module defines every error variant that can occur while decoding bytes
//! from a client, dispatching packets, and driving connections.
//!
//! ## Error Categories
//! - **Codec Errors**: VarNum decoding (`TooLarge`, `Truncated`)
//! - **Primitive Errors**: over-length strings, out-of-range coordinates
//! - **Frame Errors**: corrupt or oversized frames
//! - **Dispatch Errors**: unknown packet IDs, unknown states, short payloads
//! - **I/O Errors**: socket failures, always treated as a disconnect
//!
//! No error in this crate is fatal to the process. Frame- and dispatch-level
//! errors terminate the offending connection only.
//!
//! ## Example Usage
//! ```rust
//! use mcproto::core::varnum::decode_varint;
//! use mcproto::error::{DecodeError, ProtocolError};
//!
//! let err = decode_varint(&[0x80, 0x80]).unwrap_err();
//! assert_eq!(err, DecodeError::Truncated);
//!
//! let err: ProtocolError = err.into();
//! assert!(err.is_disconnect());
//! ```

use std::io;
use thiserror::Error;

use crate::protocol::state::ConnectionState;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Frame errors
    pub const ERR_FRAME_LENGTH_NEGATIVE: &str = "Frame length is negative";
    pub const ERR_FRAME_LENGTH_ZERO: &str = "Frame length cannot hold a packet id";
    pub const ERR_FRAME_LENGTH_VARINT: &str = "Frame length prefix is not a valid VarInt";
    pub const ERR_FRAME_PACKET_ID: &str = "Packet id overruns the declared frame length";

    /// Connection errors
    pub const ERR_CONNECTION_LIMIT: &str = "Server is full";
    pub const ERR_TIMED_OUT: &str = "Timed out";

    /// Login errors
    pub const ERR_INVALID_NAME: &str = "Invalid player name";
}

/// Failure modes of the variable-length integer codec.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The continuation chain is longer than the domain allows (5 or 10 bytes).
    #[error("VarNum exceeds its maximum encoded size")]
    TooLarge,

    /// The input ended before a terminating byte appeared.
    #[error("VarNum is truncated")]
    Truncated,
}

// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("String of {len} bytes exceeds the {max} byte limit")]
    StringTooLong { len: usize, max: usize },

    #[error("Negative length prefix: {0}")]
    NegativeLength(i32),

    #[error("Coordinate {axis}={value} is outside the packed range")]
    CoordinateOutOfRange { axis: char, value: i32 },

    #[error("Corrupt frame: {0}")]
    CorruptFrame(&'static str),

    #[error("Frame too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Invalid packet 0x{id:02X} in state {state}")]
    InvalidPacket { state: ConnectionState, id: i32 },

    #[error("Invalid connection state: {0}")]
    InvalidState(i32),

    #[error("Payload too short: needed {needed} bytes, {available} available")]
    InvalidLength { needed: usize, available: usize },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Unknown connection: {0}")]
    UnknownConnection(u64),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether the default error policy closes the connection that caused this error.
    ///
    /// Everything a client can trigger through its own byte stream is a disconnect;
    /// configuration and caller-side errors are not.
    pub fn is_disconnect(&self) -> bool {
        !matches!(
            self,
            ProtocolError::ConfigError(_)
                | ProtocolError::UnknownConnection(_)
                | ProtocolError::SerializationError(_)
        )
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::SerializationError(err.to_string())
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
