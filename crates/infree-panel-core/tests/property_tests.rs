//! Property tests for the framing path: parser and byte queue.

use std::sync::Arc;

use infree_panel_core::protocol::{
    crc8, encode_frame, FrameParser, Opcode, ParseState, SENTINEL,
};
use infree_panel_core::ByteQueue;
use proptest::prelude::*;

const MAX_FRAME: usize = 256;

fn rig() -> (FrameParser, Arc<ByteQueue>) {
    let queue = Arc::new(ByteQueue::new(16 * MAX_FRAME));
    (FrameParser::with_max_frame(queue.clone(), MAX_FRAME), queue)
}

fn drain(queue: &ByteQueue) -> Vec<u8> {
    let mut out = vec![0u8; queue.len()];
    queue.get(&mut out);
    out
}

fn noise() -> impl Strategy<Value = Vec<u8>> {
    let byte = any::<u8>().prop_filter("not a sentinel", |b| *b != SENTINEL);
    proptest::collection::vec(byte, 0..64)
}

proptest! {
    /// Adversarial input never overruns the scratch buffer, and anything
    /// that does get queued is a well-formed, checksummed frame.
    #[test]
    fn parser_survives_arbitrary_bytes(bytes in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let (mut parser, queue) = rig();
        let mut crcs = Vec::new();
        for &byte in &bytes {
            let before = queue.len();
            let was_crc = parser.state() == ParseState::Crc;
            parser.receive_byte(byte);
            if was_crc && queue.len() > before {
                crcs.push(byte);
            }
        }

        let queued = drain(&queue);
        let mut offset = 0;
        let mut frames = 0;
        while offset < queued.len() {
            prop_assert_eq!(queued[offset], SENTINEL);
            let length = u32::from_be_bytes([
                queued[offset + 1],
                queued[offset + 2],
                queued[offset + 3],
                queued[offset + 4],
            ]) as usize;
            prop_assert!(length > 2 && length < MAX_FRAME - 5);
            let end = offset + 5 + length;
            prop_assert_eq!(crc8(0, &queued[offset..end]), crcs[frames]);
            offset = end;
            frames += 1;
        }
        prop_assert_eq!(frames, crcs.len());
    }

    /// A valid frame surrounded by sentinel-free noise is queued exactly once.
    #[test]
    fn frame_found_in_noise(
        before in noise(),
        body in proptest::collection::vec(any::<u8>(), 0..200),
        after in noise(),
    ) {
        let (mut parser, queue) = rig();
        let frame = encode_frame(Opcode::BlitPng, &body).unwrap();

        parser.receive(&before);
        parser.receive(&frame);
        parser.receive(&after);

        prop_assert_eq!(drain(&queue), frame[..frame.len() - 1].to_vec());
        prop_assert_eq!(parser.state(), ParseState::Header);
    }

    /// Any corruption after the length field is caught by the CRC.
    #[test]
    fn corrupted_body_dropped(
        body in proptest::collection::vec(any::<u8>(), 2..100),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let (mut parser, queue) = rig();
        let mut frame = encode_frame(Opcode::BlitJpg, &body).unwrap();
        let at = 5 + index.index(frame.len() - 5);
        frame[at] ^= flip;

        parser.receive(&frame);
        prop_assert!(queue.is_empty());
        prop_assert_eq!(parser.state(), ParseState::Header);
    }

    /// Without overflow the queue hands bytes back in order.
    #[test]
    fn queue_preserves_order(chunks in proptest::collection::vec(
        proptest::collection::vec(any::<u8>(), 1..16), 1..16)
    ) {
        let queue = ByteQueue::new(256);
        let mut expected = Vec::new();
        for chunk in &chunks {
            prop_assert_eq!(queue.put(chunk), chunk.len());
            expected.extend_from_slice(chunk);
        }
        prop_assert_eq!(drain(&queue), expected);
        prop_assert!(queue.is_empty());
    }
}
