#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Frame splitting, partial-frame buffering and the tokio codec

use bytes::{BufMut, BytesMut};
use futures::{SinkExt, StreamExt};
use mcproto::core::codec::FrameCodec;
use mcproto::core::frame::{
    encode_frame, is_legacy_ping, split_frames, FrameReader, RawFrame, MAX_FRAME_LENGTH,
};
use mcproto::core::varnum::write_varint;
use mcproto::error::ProtocolError;
use tokio_util::codec::{Decoder, FramedRead, FramedWrite};

fn wire(frames: &[RawFrame]) -> BytesMut {
    let mut buf = BytesMut::new();
    for frame in frames {
        encode_frame(frame, &mut buf).unwrap();
    }
    buf
}

#[test]
fn two_back_to_back_frames_split_in_order() {
    let first = RawFrame::new(0x00, vec![0xAA, 0xBB]);
    let second = RawFrame::new(0x01, vec![0xCC]);
    let mut buf = wire(&[first.clone(), second.clone()]);

    let frames = split_frames(&mut buf, MAX_FRAME_LENGTH).unwrap();
    assert_eq!(frames, vec![first, second]);
    assert!(buf.is_empty());
}

#[test]
fn trailing_partial_frame_is_kept_not_misread() {
    let whole = RawFrame::new(0x05, vec![1, 2, 3]);
    let cut = RawFrame::new(0x06, vec![4; 50]);
    let mut buf = wire(&[whole.clone(), cut.clone()]);
    let full_len = buf.len();
    buf.truncate(full_len - 10);

    let frames = split_frames(&mut buf, MAX_FRAME_LENGTH).unwrap();
    assert_eq!(frames, vec![whole]);
    // the partial frame is still waiting in the buffer
    assert_eq!(buf.len(), cut.encoded_len() - 10);
}

#[test]
fn reader_joins_frame_across_reads() {
    let frame = RawFrame::new(0x10, vec![7; 1000]);
    let bytes = wire(&[frame.clone()]);

    let mut reader = FrameReader::new(MAX_FRAME_LENGTH);
    assert!(reader.is_pristine());
    assert!(reader.feed(&bytes[..1]).unwrap().is_empty());
    assert!(!reader.is_pristine());
    assert!(reader.feed(&bytes[1..600]).unwrap().is_empty());
    assert_eq!(reader.buffered(), 600);
    assert_eq!(reader.feed(&bytes[600..]).unwrap(), vec![frame]);
    assert_eq!(reader.buffered(), 0);
}

#[test]
fn reader_handles_frame_boundary_inside_length_prefix() {
    // a 300-byte body needs a two-byte length prefix; cut between those bytes
    let first = RawFrame::new(0x01, vec![1; 10]);
    let second = RawFrame::new(0x02, vec![2; 299]);
    let bytes = wire(&[first.clone(), second.clone()]);
    let boundary = first.encoded_len() + 1;

    let mut reader = FrameReader::default();
    assert_eq!(reader.feed(&bytes[..boundary]).unwrap(), vec![first]);
    assert_eq!(reader.feed(&bytes[boundary..]).unwrap(), vec![second]);
}

#[test]
fn reader_rejects_oversized_declared_length() {
    let mut header = BytesMut::new();
    write_varint(&mut header, 5000);
    header.put_u8(0x00);

    let mut reader = FrameReader::new(1024);
    assert!(matches!(
        reader.feed(&header),
        Err(ProtocolError::OversizedPacket(5000))
    ));
    assert_eq!(reader.buffered(), 0);
}

#[test]
fn legacy_ping_detection() {
    assert!(is_legacy_ping(&[0xFE, 0x01]));
    assert!(!is_legacy_ping(&[0x10, 0x00]));
    assert!(!is_legacy_ping(&[]));
}

#[test]
fn codec_waits_for_complete_frame() {
    let mut codec = FrameCodec::default();
    let bytes = wire(&[RawFrame::new(0x03, vec![9; 20])]);

    let mut buf = BytesMut::from(&bytes[..5]);
    assert_eq!(codec.decode(&mut buf).unwrap(), None);
    buf.extend_from_slice(&bytes[5..]);
    assert_eq!(
        codec.decode(&mut buf).unwrap(),
        Some(RawFrame::new(0x03, vec![9; 20]))
    );
}

#[tokio::test]
async fn framed_stream_over_duplex_pipe() {
    let (client, server) = tokio::io::duplex(64);
    let mut sink = FramedWrite::new(client, FrameCodec::default());
    let mut stream = FramedRead::new(server, FrameCodec::default());

    let sent: Vec<RawFrame> = (0..20)
        .map(|i| RawFrame::new(i, vec![i as u8; (i as usize) * 10]))
        .collect();

    let expected = sent.clone();
    let writer = tokio::spawn(async move {
        for frame in sent {
            sink.send(frame).await.unwrap();
        }
    });

    let mut received = Vec::new();
    while received.len() < expected.len() {
        received.push(stream.next().await.unwrap().unwrap());
    }
    writer.await.unwrap();
    assert_eq!(received, expected);
}
