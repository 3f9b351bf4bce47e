//! # VectorLink Codec Integration Tests
//!
//! Exercises the public API the way the network layer drives it:
//! - Arbitrary payloads surviving pack/parse
//! - Packets split at arbitrary read boundaries
//! - Sequence tracking over a reassembled stream

use bytes::BytesMut;
use proptest::prelude::*;
use vectorlink_codec::{
    decode_vector, encode_vector, pack, try_parse, FrameParser, SequenceCounter, SequenceTracker,
    VerifyOutcome,
};

proptest! {
    #[test]
    fn prop_pack_then_parse_round_trips(
        payload in proptest::collection::vec(any::<u8>(), 0..4096),
        seq in any::<u64>(),
    ) {
        let mut buffer = BytesMut::from(&pack(&payload, seq).unwrap()[..]);
        let frame = try_parse(&mut buffer).unwrap().unwrap();

        prop_assert_eq!(frame.length as usize, payload.len());
        prop_assert_eq!(frame.sequence, seq);
        prop_assert_eq!(&frame.payload[..], &payload[..]);
        prop_assert!(buffer.is_empty());
    }

    #[test]
    fn prop_stream_split_at_any_chunk_size(chunk in 1usize..64) {
        let counter = SequenceCounter::new();
        let mut wire = Vec::new();
        for i in 0..20u8 {
            let payload = vec![i; i as usize * 3];
            wire.extend_from_slice(&pack(&payload, counter.next()).unwrap());
        }

        let mut parser = FrameParser::new();
        let mut received = Vec::new();
        for piece in wire.chunks(chunk) {
            parser.extend_from_slice(piece);
            while let Some(frame) = parser.next_frame().unwrap() {
                received.push(frame);
            }
        }

        prop_assert_eq!(received.len(), 20);
        for (i, frame) in received.iter().enumerate() {
            prop_assert_eq!(frame.sequence, i as u64);
            prop_assert_eq!(frame.payload.len(), i * 3);
        }
        prop_assert!(parser.is_empty());
    }
}

#[test]
fn test_large_payload_round_trip() {
    let payload = vec![0x5A; 10 * 1024 * 1024];
    let mut buffer = BytesMut::from(&pack(&payload, 1).unwrap()[..]);
    let frame = try_parse(&mut buffer).unwrap().unwrap();
    assert_eq!(frame.payload.len(), payload.len());
}

#[test]
fn test_vector_stream_with_skipped_sequence() {
    let counter = SequenceCounter::new();
    let mut parser = FrameParser::new();

    for i in 0..4 {
        if i == 2 {
            counter.skip();
        }
        let payload = encode_vector(&[i as f64; 5]).unwrap();
        parser.extend_from_slice(&pack(&payload, counter.next()).unwrap());
    }

    let mut tracker = SequenceTracker::new();
    let mut outcomes = Vec::new();
    let mut vectors = Vec::new();
    while let Some(frame) = parser.next_frame().unwrap() {
        outcomes.push(tracker.verify(frame.sequence));
        vectors.push(decode_vector(&frame.payload).unwrap());
    }

    assert_eq!(
        outcomes,
        vec![
            VerifyOutcome::InOrder,
            VerifyOutcome::InOrder,
            VerifyOutcome::SingleDrop,
            VerifyOutcome::InOrder,
        ]
    );
    assert_eq!(tracker.total_drops(), 1);
    assert_eq!(vectors[3], vec![3.0; 5]);
}
