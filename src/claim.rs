// Single-use handle over a reserved, not-yet-published frame.
use crate::buffer::AtomicBuffer;
use crate::frame::{length_offset, type_offset, PADDING_FRAME_TYPE};

/// A reserved payload region awaiting in-place encoding.
///
/// Returned by [`TermAppender::claim`](crate::appender::TermAppender::claim).
/// The frame's header is already written but its length field is not, so
/// readers treat the span as unavailable until [`commit`](Self::commit)
/// publishes it. Both `commit` and [`abort`](Self::abort) consume the handle,
/// so a claim publishes at most once. A handle that is dropped without
/// either leaves the reserved span permanently unpublished.
#[derive(Debug)]
pub struct BufferClaim<'a> {
    buffer: &'a AtomicBuffer,
    frame_offset: usize,
    offset: usize,
    length: usize,
    frame_length: usize,
}

impl<'a> BufferClaim<'a> {
    pub(crate) fn new(
        buffer: &'a AtomicBuffer,
        frame_offset: usize,
        offset: usize,
        length: usize,
        frame_length: usize,
    ) -> Self {
        Self {
            buffer,
            frame_offset,
            offset,
            length,
            frame_length,
        }
    }

    /// The log buffer the claimed region lives in.
    pub fn buffer(&self) -> &AtomicBuffer {
        self.buffer
    }

    /// Start of the claimed payload region within the log buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the claimed payload region in bytes.
    pub fn length(&self) -> usize {
        self.length
    }

    /// The claimed payload region, for direct encoding.
    pub fn mut_slice(&mut self) -> &mut [u8] {
        // Safety: the span was reserved by the tail fetch-and-add and stays
        // unpublished until this handle is consumed, so no reader or other
        // producer touches it.
        unsafe { self.buffer.slice_mut(self.offset, self.length) }
    }

    /// Publish the frame: write its true length with release ordering,
    /// making the header and payload visible to readers.
    pub fn commit(self) {
        self.buffer
            .put_u32_ordered(length_offset(self.frame_offset), self.frame_length as u32);
    }

    /// Give up on the claim: rewrite the frame as padding of the same
    /// extent and publish it, so readers skip the span instead of waiting
    /// on it forever.
    pub fn abort(self) {
        self.buffer
            .put_u16(type_offset(self.frame_offset), PADDING_FRAME_TYPE);
        self.buffer
            .put_u32_ordered(length_offset(self.frame_offset), self.frame_length as u32);
    }
}

#[cfg(test)]
mod tests {
    use crate::appender::{ClaimOutcome, TermAppender};
    use crate::buffer::AlignedBuffer;
    use crate::frame::{length_offset, type_offset, PADDING_FRAME_TYPE};
    use crate::segment::{STATE_BUFFER_LENGTH, TERM_MIN_LENGTH};

    const MAX_FRAME_LENGTH: usize = 1024;
    const HEADER: [u8; 16] = [0xEE; 16];

    struct Fixture {
        log: AlignedBuffer,
        state: AlignedBuffer,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                log: AlignedBuffer::zeroed(TERM_MIN_LENGTH),
                state: AlignedBuffer::zeroed(STATE_BUFFER_LENGTH),
            }
        }

        fn appender(&self) -> TermAppender {
            TermAppender::new(self.log.buffer(), self.state.buffer(), &HEADER, MAX_FRAME_LENGTH)
                .expect("valid appender")
        }
    }

    #[test]
    fn commit_publishes_true_frame_length() {
        let fixture = Fixture::new();
        let appender = fixture.appender();

        let mut claim = match appender.claim(20).expect("claim") {
            ClaimOutcome::Claimed(claim) => claim,
            other => panic!("expected a claim, got {other:?}"),
        };
        assert_eq!(claim.offset(), HEADER.len());
        assert_eq!(claim.length(), 20);

        claim.mut_slice().fill(0x5A);
        assert_eq!(fixture.log.buffer().get_u32_volatile(length_offset(0)), 0);

        claim.commit();
        let log = fixture.log.buffer();
        assert_eq!(
            log.get_u32_volatile(length_offset(0)),
            (HEADER.len() + 20) as u32
        );
        let mut payload = [0u8; 20];
        log.get_bytes(HEADER.len(), &mut payload);
        assert_eq!(payload, [0x5A; 20]);
    }

    #[test]
    fn abort_rewrites_frame_as_padding() {
        let fixture = Fixture::new();
        let appender = fixture.appender();

        let claim = match appender.claim(20).expect("claim") {
            ClaimOutcome::Claimed(claim) => claim,
            other => panic!("expected a claim, got {other:?}"),
        };
        claim.abort();

        let log = fixture.log.buffer();
        assert_eq!(log.get_u16(type_offset(0)), PADDING_FRAME_TYPE);
        assert_eq!(
            log.get_u32_volatile(length_offset(0)),
            (HEADER.len() + 20) as u32
        );
    }
}
