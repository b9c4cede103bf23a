//! # Frame Reader
//!
//! Splits a byte stream into protocol frames.
//!
//! ## Wire Format
//! ```text
//! [VarInt totalLength] [VarInt packetId] [payload]
//! ```
//! `totalLength` counts the packet id and payload, not itself.
//!
//! A TCP read may end in the middle of a frame. [`FrameReader`] keeps the
//! unconsumed tail of every read and prepends it to the next one, so a frame
//! split across reads is decoded once its last byte arrives.
//!
//! ## Security
//! - The declared length is checked against a cap before anything is buffered
//! - A frame whose packet id overruns its declared length is rejected as corrupt
//! - After a corrupt frame the rest of the buffer is discarded; no resync is attempted

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::core::varnum::{self, VARINT_MAX_BYTES};
use crate::error::{constants, DecodeError, ProtocolError, Result};

/// Largest frame length a 3-byte VarInt can express; the protocol's own limit.
pub const MAX_FRAME_LENGTH: usize = 2_097_151;

/// First byte of the pre-netty server list ping.
pub const LEGACY_PING_ID: u8 = 0xFE;

/// One decoded frame: a packet id and the payload bytes that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub packet_id: i32,
    pub payload: Bytes,
}

impl RawFrame {
    pub fn new(packet_id: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            packet_id,
            payload: payload.into(),
        }
    }

    /// Size of this frame once length-prefixed.
    pub fn encoded_len(&self) -> usize {
        let body = varnum::varint_len(self.packet_id) + self.payload.len();
        varnum::varint_len(body as i32) + body
    }
}

/// Decodes one frame from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` does not yet hold a complete frame; nothing is
/// consumed in that case. On success the frame's bytes are split off `buf`
/// without copying.
pub fn decode_frame(buf: &mut BytesMut, max_frame_length: usize) -> Result<Option<RawFrame>> {
    let (total_len, header_len) = match varnum::decode_varint(&buf[..]) {
        Ok(decoded) => decoded,
        Err(DecodeError::Truncated) => return Ok(None),
        Err(DecodeError::TooLarge) => {
            return Err(ProtocolError::CorruptFrame(constants::ERR_FRAME_LENGTH_VARINT))
        }
    };

    if total_len < 0 {
        return Err(ProtocolError::CorruptFrame(
            constants::ERR_FRAME_LENGTH_NEGATIVE,
        ));
    }
    if total_len == 0 {
        return Err(ProtocolError::CorruptFrame(constants::ERR_FRAME_LENGTH_ZERO));
    }

    let total_len = total_len as usize;
    if total_len > max_frame_length {
        return Err(ProtocolError::OversizedPacket(total_len));
    }

    let available = buf.len() - header_len;
    if available < total_len {
        buf.reserve(total_len - available);
        return Ok(None);
    }

    // The id must fit inside the declared length; otherwise the remaining
    // payload length would be negative.
    let body = &buf[header_len..header_len + total_len];
    let (packet_id, id_len) = varnum::decode_varint(body)
        .map_err(|_| ProtocolError::CorruptFrame(constants::ERR_FRAME_PACKET_ID))?;

    buf.advance(header_len);
    let mut frame = buf.split_to(total_len).freeze();
    frame.advance(id_len);

    Ok(Some(RawFrame {
        packet_id,
        payload: frame,
    }))
}

/// Decodes every complete frame in `buf`, in arrival order.
///
/// Any trailing partial frame stays in `buf`.
pub fn split_frames(buf: &mut BytesMut, max_frame_length: usize) -> Result<Vec<RawFrame>> {
    let mut frames = Vec::new();
    while let Some(frame) = decode_frame(buf, max_frame_length)? {
        frames.push(frame);
    }
    Ok(frames)
}

/// Writes `frame` with its length prefix.
pub fn encode_frame(frame: &RawFrame, dst: &mut BytesMut) -> Result<()> {
    let body_len = varnum::varint_len(frame.packet_id) + frame.payload.len();
    if body_len > MAX_FRAME_LENGTH {
        return Err(ProtocolError::OversizedPacket(body_len));
    }

    dst.reserve(VARINT_MAX_BYTES + body_len);
    varnum::write_varint(dst, body_len as i32);
    varnum::write_varint(dst, frame.packet_id);
    dst.put_slice(&frame.payload);
    Ok(())
}

/// Whether `chunk` opens with the legacy server list ping rather than a frame.
///
/// Only meaningful for the first bytes received on a connection.
#[inline]
pub fn is_legacy_ping(chunk: &[u8]) -> bool {
    chunk.first() == Some(&LEGACY_PING_ID)
}

/// Per-connection frame splitter that carries partial frames across reads.
#[derive(Debug)]
pub struct FrameReader {
    buf: BytesMut,
    max_frame_length: usize,
    bytes_seen: u64,
    failed: bool,
}

impl FrameReader {
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            max_frame_length,
            bytes_seen: 0,
            failed: false,
        }
    }

    /// Appends `chunk` and returns every frame it completes.
    ///
    /// After a corrupt frame the reader discards its buffer and rejects all
    /// further input; the connection is expected to be closed.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<RawFrame>> {
        if self.failed {
            return Err(ProtocolError::ConnectionClosed);
        }

        self.bytes_seen += chunk.len() as u64;
        self.buf.extend_from_slice(chunk);

        match split_frames(&mut self.buf, self.max_frame_length) {
            Ok(frames) => Ok(frames),
            Err(e) => {
                self.failed = true;
                self.buf.clear();
                Err(e)
            }
        }
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// True until the first byte is fed.
    pub fn is_pristine(&self) -> bool {
        self.bytes_seen == 0
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new(MAX_FRAME_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn encoded(frame: &RawFrame) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(frame, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_encode_layout() {
        let buf = encoded(&RawFrame::new(0x01, vec![0xAA, 0xBB]));
        assert_eq!(&buf[..], &[0x03, 0x01, 0xAA, 0xBB]);
        assert_eq!(RawFrame::new(0x01, vec![0xAA, 0xBB]).encoded_len(), 4);
    }

    #[test]
    fn test_two_back_to_back_frames() {
        let mut buf = encoded(&RawFrame::new(0x00, vec![1, 2, 3]));
        buf.extend_from_slice(&encoded(&RawFrame::new(0x0B, vec![9; 8])));

        let frames = split_frames(&mut buf, MAX_FRAME_LENGTH).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], RawFrame::new(0x00, vec![1, 2, 3]));
        assert_eq!(frames[1], RawFrame::new(0x0B, vec![9; 8]));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_payload_frame() {
        let mut buf = BytesMut::from(&[0x01, 0x00][..]);
        let frames = split_frames(&mut buf, MAX_FRAME_LENGTH).unwrap();
        assert_eq!(frames, vec![RawFrame::new(0x00, Bytes::new())]);
    }

    #[test]
    fn test_partial_frame_left_in_buffer() {
        let full = encoded(&RawFrame::new(0x02, b"hello".to_vec()));
        let mut buf = BytesMut::from(&full[..4]);
        assert!(split_frames(&mut buf, MAX_FRAME_LENGTH).unwrap().is_empty());
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_zero_length_is_corrupt() {
        let mut buf = BytesMut::from(&[0x00, 0x05][..]);
        assert!(matches!(
            decode_frame(&mut buf, MAX_FRAME_LENGTH),
            Err(ProtocolError::CorruptFrame(_))
        ));
    }

    #[test]
    fn test_negative_length_is_corrupt() {
        let mut buf = BytesMut::from(&varnum::encode_varint(-3)[..]);
        assert!(matches!(
            decode_frame(&mut buf, MAX_FRAME_LENGTH),
            Err(ProtocolError::CorruptFrame(_))
        ));
    }

    #[test]
    fn test_packet_id_longer_than_length_is_corrupt() {
        // length 1, but the id needs two bytes
        let mut buf = BytesMut::from(&[0x01, 0x80, 0x01][..]);
        assert!(matches!(
            decode_frame(&mut buf, MAX_FRAME_LENGTH),
            Err(ProtocolError::CorruptFrame(_))
        ));
    }

    #[test]
    fn test_oversized_rejected_before_buffering() {
        let mut buf = BytesMut::new();
        varnum::write_varint(&mut buf, 1_000_000);
        assert!(matches!(
            decode_frame(&mut buf, 1024),
            Err(ProtocolError::OversizedPacket(1_000_000))
        ));
    }

    #[test]
    fn test_reader_reassembles_split_frame() {
        let mut wire = encoded(&RawFrame::new(0x03, b"split".to_vec()));
        wire.extend_from_slice(&encoded(&RawFrame::new(0x04, b"next".to_vec())));

        let mut reader = FrameReader::default();
        assert!(reader.is_pristine());

        let first = reader.feed(&wire[..5]).unwrap();
        assert!(first.is_empty());
        assert_eq!(reader.buffered(), 5);
        assert!(!reader.is_pristine());

        let rest = reader.feed(&wire[5..]).unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0], RawFrame::new(0x03, b"split".to_vec()));
        assert_eq!(rest[1], RawFrame::new(0x04, b"next".to_vec()));
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn test_reader_byte_at_a_time() {
        let wire = encoded(&RawFrame::new(0x10, vec![7; 300]));
        let mut reader = FrameReader::default();
        let mut frames = Vec::new();
        for byte in wire.iter() {
            frames.extend(reader.feed(&[*byte]).unwrap());
        }
        assert_eq!(frames, vec![RawFrame::new(0x10, vec![7; 300])]);
    }

    #[test]
    fn test_reader_stops_after_corrupt_frame() {
        let mut reader = FrameReader::default();
        let mut wire = BytesMut::from(&[0x00][..]);
        wire.extend_from_slice(&encoded(&RawFrame::new(0x00, vec![1])));
        assert!(reader.feed(&wire).is_err());
        assert!(reader.has_failed());
        assert_eq!(reader.buffered(), 0);
        assert!(reader.feed(&[0x01, 0x00]).is_err());
    }

    #[test]
    fn test_legacy_ping_detection() {
        assert!(is_legacy_ping(&[0xFE, 0x01]));
        assert!(!is_legacy_ping(&[0x10, 0x00]));
        assert!(!is_legacy_ping(&[]));
    }
}
