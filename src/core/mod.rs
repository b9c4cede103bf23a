//! # Core Protocol Components
//!
//! Low-level byte handling: the VarNum codec, wire primitives, and framing.
//!
//! This module is pure and synchronous. It never touches sockets or locks and
//! every function is safe to call on attacker-controlled input.
//!
//! ## Components
//! - **VarNum**: 32/64-bit variable-length integers
//! - **Wire**: length-limited strings, packed positions, payload reader/writer
//! - **Frame**: length-delimited frame splitting with cross-read buffering
//! - **Codec**: Tokio codec for framing over byte streams
//!
//! ## Wire Format
//! ```text
//! [VarInt length] [VarInt packetId] [payload(length - len(packetId))]
//! ```
//!
//! ## Security
//! - Maximum frame length: 2,097,151 bytes (3-byte VarInt)
//! - VarNum decoding is bounded to 5 / 10 bytes
//! - Length validation before allocation

pub mod codec;
pub mod frame;
pub mod varnum;
pub mod wire;
