//! # Wire Primitives
//!
//! Field-level building blocks shared by every packet payload:
//!
//! - [`WireString`]: `[VarInt byteLength][UTF-8 bytes]`, bounded by a [`StringPolicy`]
//! - [`Position`]: three signed coordinates packed into one 64-bit integer
//! - [`PacketReader`]: bounds-checked cursor over a payload
//! - [`PacketWriter`]: builder for outbound payloads
//!
//! ## Position layout
//! ```text
//!  63                38 37        26 25                 0
//! [      x (26 bits)   |  y (12 bits) |      z (26 bits)  ]
//! ```
//! Each field is two's-complement within its own width. This is the wire
//! format for protocol version 340 and is treated as a compatibility contract.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::borrow::Cow;
use uuid::Uuid;

use crate::core::varnum::{self, VARINT_MAX_BYTES, VARLONG_MAX_BYTES};
use crate::error::{DecodeError, ProtocolError, Result};

/// Maximum byte length of a string under one of the protocol's length policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringPolicy {
    max_bytes: usize,
}

impl StringPolicy {
    /// Identifiers, names, and most serverbound strings.
    pub const SHORT: StringPolicy = StringPolicy { max_bytes: 32_767 };

    /// JSON chat components sent to the client.
    pub const CHAT: StringPolicy = StringPolicy { max_bytes: 262_144 };

    /// A packet-specific cap, in bytes.
    pub const fn bytes(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Largest accepted byte length.
    pub const fn max_bytes(self) -> usize {
        self.max_bytes
    }

    /// Validates a byte length against this policy.
    pub fn check(self, len: usize) -> Result<()> {
        if len > self.max_bytes {
            return Err(ProtocolError::StringTooLong {
                len,
                max: self.max_bytes,
            });
        }
        Ok(())
    }
}

impl Default for StringPolicy {
    fn default() -> Self {
        Self::SHORT
    }
}

/// A length-prefixed protocol string.
///
/// The contents are held as raw bytes. Incoming strings are not required to be
/// valid UTF-8; callers that need text use [`WireString::as_str`] or
/// [`WireString::to_string_lossy`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WireString {
    bytes: Bytes,
}

impl WireString {
    /// Builds a string for sending, rejecting it before copying if it exceeds `policy`.
    pub fn new(value: &str, policy: StringPolicy) -> Result<Self> {
        policy.check(value.len())?;
        Ok(Self {
            bytes: Bytes::copy_from_slice(value.as_bytes()),
        })
    }

    /// Decodes a string from the front of `buf`, advancing past it.
    pub fn decode(buf: &mut Bytes, policy: StringPolicy) -> Result<Self> {
        let (len, consumed) = varnum::decode_varint(&buf[..])?;
        if len < 0 {
            return Err(ProtocolError::NegativeLength(len));
        }
        let len = len as usize;
        policy.check(len)?;

        let available = buf.len() - consumed;
        if available < len {
            return Err(ProtocolError::InvalidLength {
                needed: len,
                available,
            });
        }

        buf.advance(consumed);
        Ok(Self {
            bytes: buf.split_to(len),
        })
    }

    /// Appends `[VarInt len][bytes]` to `buf`.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        varnum::write_varint(buf, self.bytes.len() as i32);
        buf.put_slice(&self.bytes);
    }

    /// Number of bytes this string occupies on the wire, prefix included.
    pub fn encoded_len(&self) -> usize {
        varnum::varint_len(self.bytes.len() as i32) + self.bytes.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The contents, if they are valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A block position packed into 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    pub const X_BITS: u32 = 26;
    pub const Y_BITS: u32 = 12;
    pub const Z_BITS: u32 = 26;

    pub const X_MIN: i32 = -(1 << (Self::X_BITS - 1));
    pub const X_MAX: i32 = (1 << (Self::X_BITS - 1)) - 1;
    pub const Y_MIN: i32 = -(1 << (Self::Y_BITS - 1));
    pub const Y_MAX: i32 = (1 << (Self::Y_BITS - 1)) - 1;
    pub const Z_MIN: i32 = -(1 << (Self::Z_BITS - 1));
    pub const Z_MAX: i32 = (1 << (Self::Z_BITS - 1)) - 1;

    /// Creates a position, failing if any component does not fit its field.
    pub fn new(x: i32, y: i32, z: i32) -> Result<Self> {
        check_axis('x', x, Self::X_MIN, Self::X_MAX)?;
        check_axis('y', y, Self::Y_MIN, Self::Y_MAX)?;
        check_axis('z', z, Self::Z_MIN, Self::Z_MAX)?;
        Ok(Self { x, y, z })
    }

    /// Packs the three components into their wire representation.
    ///
    /// Components are validated at construction; a `Position` built with struct
    /// literal syntax is re-checked here.
    pub fn pack(&self) -> Result<i64> {
        let p = Self::new(self.x, self.y, self.z)?;
        let x = (p.x as i64) & mask(Self::X_BITS);
        let y = (p.y as i64) & mask(Self::Y_BITS);
        let z = (p.z as i64) & mask(Self::Z_BITS);
        Ok((x << (Self::Y_BITS + Self::Z_BITS)) | (y << Self::Z_BITS) | z)
    }

    /// Unpacks a wire value, sign-extending each field from its own width.
    pub fn unpack(packed: i64) -> Self {
        let raw = packed as u64;
        let x = (raw >> (Self::Y_BITS + Self::Z_BITS)) as i64;
        let y = ((raw >> Self::Z_BITS) as i64) & mask(Self::Y_BITS);
        let z = (raw as i64) & mask(Self::Z_BITS);
        Self {
            x: sign_extend(x, Self::X_BITS),
            y: sign_extend(y, Self::Y_BITS),
            z: sign_extend(z, Self::Z_BITS),
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

fn check_axis(axis: char, value: i32, min: i32, max: i32) -> Result<()> {
    if value < min || value > max {
        return Err(ProtocolError::CoordinateOutOfRange { axis, value });
    }
    Ok(())
}

#[inline]
fn mask(bits: u32) -> i64 {
    (1i64 << bits) - 1
}

#[inline]
fn sign_extend(value: i64, bits: u32) -> i32 {
    let shift = 64 - bits;
    ((value << shift) >> shift) as i32
}

/// Bounds-checked reader over a packet payload.
///
/// Every read that would run past the end of the payload fails with
/// [`ProtocolError::InvalidLength`] instead of panicking.
#[derive(Debug, Clone)]
pub struct PacketReader {
    buf: Bytes,
}

impl PacketReader {
    pub fn new(payload: Bytes) -> Self {
        Self { buf: payload }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.len() < needed {
            return Err(ProtocolError::InvalidLength {
                needed,
                available: self.buf.len(),
            });
        }
        Ok(())
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.ensure(1)?;
        Ok(self.buf.get_i8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.ensure(2)?;
        Ok(self.buf.get_i16())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.ensure(8)?;
        Ok(self.buf.get_i64())
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.ensure(4)?;
        Ok(self.buf.get_f32())
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.ensure(8)?;
        Ok(self.buf.get_f64())
    }

    /// Reads a VarInt. A truncated VarInt is reported as a short payload.
    pub fn read_varint(&mut self) -> Result<i32> {
        match varnum::decode_varint(&self.buf) {
            Ok((value, consumed)) => {
                self.buf.advance(consumed);
                Ok(value)
            }
            Err(DecodeError::Truncated) => Err(ProtocolError::InvalidLength {
                needed: self.buf.len() + 1,
                available: self.buf.len(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_varlong(&mut self) -> Result<i64> {
        match varnum::decode_varlong(&self.buf) {
            Ok((value, consumed)) => {
                self.buf.advance(consumed);
                Ok(value)
            }
            Err(DecodeError::Truncated) => Err(ProtocolError::InvalidLength {
                needed: (self.buf.len() + 1).min(VARLONG_MAX_BYTES),
                available: self.buf.len(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_wire_string(&mut self, policy: StringPolicy) -> Result<WireString> {
        if let Err(DecodeError::Truncated) = varnum::decode_varint(&self.buf) {
            return Err(ProtocolError::InvalidLength {
                needed: (self.buf.len() + 1).min(VARINT_MAX_BYTES),
                available: self.buf.len(),
            });
        }
        WireString::decode(&mut self.buf, policy)
    }

    /// Reads a string, replacing invalid UTF-8 sequences.
    pub fn read_string(&mut self, policy: StringPolicy) -> Result<String> {
        Ok(self.read_wire_string(policy)?.to_string_lossy().into_owned())
    }

    pub fn read_position(&mut self) -> Result<Position> {
        Ok(Position::unpack(self.read_i64()?))
    }

    pub fn read_uuid(&mut self) -> Result<Uuid> {
        self.ensure(16)?;
        Ok(Uuid::from_u128(self.buf.get_u128()))
    }

    /// Reads a VarInt-prefixed byte array of at most `max` bytes.
    pub fn read_byte_array(&mut self, max: usize) -> Result<Bytes> {
        let len = self.read_varint()?;
        if len < 0 {
            return Err(ProtocolError::NegativeLength(len));
        }
        let len = len as usize;
        if len > max {
            return Err(ProtocolError::OversizedPacket(len));
        }
        self.ensure(len)?;
        Ok(self.buf.split_to(len))
    }

    /// Takes everything left in the payload.
    pub fn read_remaining(&mut self) -> Bytes {
        std::mem::take(&mut self.buf)
    }
}

/// Builder for outbound payloads.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: BytesMut,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.buf.put_u8(u8::from(value));
        self
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn write_i8(&mut self, value: i8) -> &mut Self {
        self.buf.put_i8(value);
        self
    }

    pub fn write_i16(&mut self, value: i16) -> &mut Self {
        self.buf.put_i16(value);
        self
    }

    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32(value);
        self
    }

    pub fn write_i64(&mut self, value: i64) -> &mut Self {
        self.buf.put_i64(value);
        self
    }

    pub fn write_f32(&mut self, value: f32) -> &mut Self {
        self.buf.put_f32(value);
        self
    }

    pub fn write_f64(&mut self, value: f64) -> &mut Self {
        self.buf.put_f64(value);
        self
    }

    pub fn write_varint(&mut self, value: i32) -> &mut Self {
        varnum::write_varint(&mut self.buf, value);
        self
    }

    pub fn write_varlong(&mut self, value: i64) -> &mut Self {
        varnum::write_varlong(&mut self.buf, value);
        self
    }

    pub fn write_wire_string(&mut self, value: &WireString) -> &mut Self {
        value.encode(&mut self.buf);
        self
    }

    /// Writes `value` after validating it against `policy`.
    pub fn write_str(&mut self, value: &str, policy: StringPolicy) -> Result<&mut Self> {
        let s = WireString::new(value, policy)?;
        Ok(self.write_wire_string(&s))
    }

    pub fn write_position(&mut self, value: Position) -> Result<&mut Self> {
        let packed = value.pack()?;
        Ok(self.write_i64(packed))
    }

    pub fn write_uuid(&mut self, value: Uuid) -> &mut Self {
        self.buf.put_u128(value.as_u128());
        self
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.buf.put_slice(value);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}
