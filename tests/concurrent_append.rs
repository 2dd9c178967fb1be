// Concurrent producers appending into one term until it trips, then a full
// scan of the published frames.
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use termlog::frame::{
    align_up, flags_offset, length_offset, term_offset_offset, type_offset, FRAME_ALIGNMENT,
    PADDING_FRAME_TYPE, UNFRAGMENTED,
};
use termlog::segment::{STATE_BUFFER_LENGTH, TERM_MIN_LENGTH};
use termlog::{AlignedBuffer, AppendOutcome, ClaimOutcome, TermAppender};

const MAX_FRAME_LENGTH: usize = 1024;
const HEADER_LENGTH: usize = 32;

struct Shared {
    log: AlignedBuffer,
    state: AlignedBuffer,
    header: [u8; HEADER_LENGTH],
}

impl Shared {
    fn new() -> Self {
        let mut header = [0u8; HEADER_LENGTH];
        // Non-padding frame type in the template; trailing bytes are
        // application-defined and survive into every frame.
        header[6..8].copy_from_slice(&1u16.to_le_bytes());
        header[12..].fill(0xD0);
        Self {
            log: AlignedBuffer::zeroed(TERM_MIN_LENGTH),
            state: AlignedBuffer::zeroed(STATE_BUFFER_LENGTH),
            header,
        }
    }

    fn appender(&self) -> TermAppender {
        TermAppender::new(
            self.log.buffer(),
            self.state.buffer(),
            &self.header,
            MAX_FRAME_LENGTH,
        )
        .expect("valid appender")
    }
}

#[test]
fn producers_fill_term_without_overlapping() {
    let shared = Arc::new(Shared::new());
    let copy_producers = 4;
    let claim_producers = 2;

    let mut handles = Vec::new();
    for id in 0..copy_producers {
        let shared = Arc::clone(&shared);
        handles.push(thread::spawn(move || {
            let appender = shared.appender();
            let marker = 0x10 + id as u8;
            let msg = vec![marker; 48 + id * 8];
            let mut published = 0usize;
            loop {
                match appender.append(&msg).expect("append") {
                    AppendOutcome::Success => published += 1,
                    AppendOutcome::Tripped | AppendOutcome::Failure => break,
                }
            }
            (marker, published)
        }));
    }
    for id in 0..claim_producers {
        let shared = Arc::clone(&shared);
        handles.push(thread::spawn(move || {
            let appender = shared.appender();
            let marker = 0x80 + id as u8;
            let mut published = 0usize;
            loop {
                match appender.claim(40).expect("claim") {
                    ClaimOutcome::Claimed(mut claim) => {
                        claim.mut_slice().fill(marker);
                        claim.commit();
                        published += 1;
                    }
                    ClaimOutcome::Tripped | ClaimOutcome::Failure => break,
                }
            }
            (marker, published)
        }));
    }

    let mut published: HashMap<u8, usize> = HashMap::new();
    for handle in handles {
        let (marker, count) = handle.join().expect("producer thread");
        if count > 0 {
            published.insert(marker, count);
        }
    }

    let appender = shared.appender();
    assert_eq!(appender.tail(), TERM_MIN_LENGTH);
    assert_eq!(appender.tail_volatile(), TERM_MIN_LENGTH);

    // Every byte up to capacity belongs to exactly one published frame.
    let log = shared.log.buffer();
    let mut observed: HashMap<u8, usize> = HashMap::new();
    let mut padding_frames = 0usize;
    let mut offset = 0usize;
    while offset < TERM_MIN_LENGTH {
        assert_eq!(offset % FRAME_ALIGNMENT, 0);
        let frame_length = log.get_u32_volatile(length_offset(offset)) as usize;
        assert!(frame_length > 0, "unpublished gap at {offset}");

        if log.get_u16(type_offset(offset)) == PADDING_FRAME_TYPE {
            // Padding runs exactly to the end of the term.
            assert_eq!(offset + frame_length, TERM_MIN_LENGTH);
            padding_frames += 1;
        } else {
            assert!(frame_length >= HEADER_LENGTH);
            assert_eq!(log.get_u32(term_offset_offset(offset)), offset as u32);
            assert_eq!(log.get_u8(flags_offset(offset)), UNFRAGMENTED);
            let payload_length = frame_length - HEADER_LENGTH;
            let mut payload = vec![0u8; payload_length];
            log.get_bytes(offset + HEADER_LENGTH, &mut payload);
            let marker = payload[0];
            assert!(payload.iter().all(|&byte| byte == marker), "torn payload");
            *observed.entry(marker).or_default() += 1;
        }

        offset += align_up(frame_length, FRAME_ALIGNMENT);
    }

    assert_eq!(offset, TERM_MIN_LENGTH);
    assert!(padding_frames <= 1);
    assert_eq!(observed, published);
}

#[test]
fn fragmented_messages_interleave_with_unfragmented_ones() {
    let shared = Shared::new();
    let appender = shared.appender();
    let max_payload = appender.max_payload_length();

    let big = vec![0xABu8; max_payload * 2 + 100];
    let small = vec![0xCDu8; 64];
    assert_eq!(appender.append(&big).expect("append"), AppendOutcome::Success);
    assert_eq!(appender.append(&small).expect("append"), AppendOutcome::Success);

    let log = shared.log.buffer();
    let mut offset = 0usize;
    let mut reassembled = Vec::new();
    let mut frames = 0usize;
    while frames < 3 {
        let frame_length = log.get_u32_volatile(length_offset(offset)) as usize;
        let mut payload = vec![0u8; frame_length - HEADER_LENGTH];
        log.get_bytes(offset + HEADER_LENGTH, &mut payload);
        reassembled.extend_from_slice(&payload);
        offset += align_up(frame_length, FRAME_ALIGNMENT);
        frames += 1;
    }
    assert_eq!(reassembled, big);

    let frame_length = log.get_u32_volatile(length_offset(offset)) as usize;
    assert_eq!(frame_length, HEADER_LENGTH + small.len());
    assert_eq!(log.get_u8(flags_offset(offset)), UNFRAGMENTED);
}
