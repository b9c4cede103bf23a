//! Tokio codec over the frame format.
//!
//! [`FrameCodec`] plugs [`decode_frame`] and [`encode_frame`] into
//! `tokio_util::codec`, so a socket can be driven as a `Stream` of
//! [`RawFrame`]s and a `Sink` of outbound frames. The server's writer half and
//! test clients both use it.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::core::frame::{decode_frame, encode_frame, RawFrame, MAX_FRAME_LENGTH};
use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_length: usize,
}

impl FrameCodec {
    pub fn new(max_frame_length: usize) -> Self {
        Self { max_frame_length }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_LENGTH)
    }
}

impl Decoder for FrameCodec {
    type Item = RawFrame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src, self.max_frame_length)
    }
}

impl Encoder<RawFrame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: RawFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&item, dst)
    }
}

impl Encoder<&RawFrame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: &RawFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(item, dst)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn test_codec_roundtrip_preserves_order() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(RawFrame::new(0x00, vec![1]), &mut buf).unwrap();
        codec.encode(&RawFrame::new(0x01, vec![2, 3]), &mut buf).unwrap();

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(RawFrame::new(0x00, vec![1]))
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(RawFrame::new(0x01, vec![2, 3]))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_codec_respects_max_length() {
        let mut codec = FrameCodec::new(4);
        let mut buf = BytesMut::from(&[0x05, 0x00, 0x00, 0x00, 0x00, 0x00][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::OversizedPacket(5))
        ));
    }
}
