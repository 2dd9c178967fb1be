// The append engine: wait-free reservation, framing, fragmentation, and
// padding-on-exhaustion for one term's log buffer.
use crate::buffer::AtomicBuffer;
use crate::claim::BufferClaim;
use crate::error::{Error, ErrorKind};
use crate::frame::{
    align_up, flags_offset, length_offset, term_offset_offset, type_offset, BASE_HEADER_LENGTH,
    BEGIN_FRAGMENT, END_FRAGMENT, FRAME_ALIGNMENT, LENGTH_FIELD_LENGTH, MAX_FRAGMENT_COUNT,
    PADDING_FRAME_TYPE, UNFRAGMENTED,
};
use crate::segment::{
    check_default_header, check_max_frame_length, check_state_buffer, check_term_buffer,
    TAIL_COUNTER_OFFSET,
};

/// Outcome of a copy-append. Exhaustion is a normal steady-state condition,
/// so it is a value rather than an error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AppendOutcome {
    /// The message was framed, written, and published.
    Success,
    /// The reservation ran off the end of the term; this call marked the
    /// term exhausted, padding the remainder if any bytes were left.
    Tripped,
    /// A previous reservation already tripped the term; nothing was written.
    Failure,
}

/// Outcome of a zero-copy claim.
#[derive(Debug)]
pub enum ClaimOutcome<'a> {
    /// The span is reserved and its header written; publication is deferred
    /// to the handle's commit.
    Claimed(BufferClaim<'a>),
    /// See [`AppendOutcome::Tripped`].
    Tripped,
    /// See [`AppendOutcome::Failure`].
    Failure,
}

enum Reserved {
    At(usize),
    Tripped,
    Failure,
}

/// Appends framed messages to a term's log buffer on behalf of any number
/// of concurrent producers.
///
/// The only cross-producer coordination is an atomic fetch-and-add on the
/// tail counter held in the metadata region; each call reserves a disjoint
/// span and writes it without locks. A frame becomes visible to readers
/// when its length field is written, last, with release ordering.
#[derive(Debug)]
pub struct TermAppender {
    log: AtomicBuffer,
    state: AtomicBuffer,
    default_header: Vec<u8>,
    capacity: usize,
    max_frame_length: usize,
    max_payload_length: usize,
    max_message_length: usize,
}

impl TermAppender {
    /// Validate the geometry of the log buffer, metadata region, default
    /// header template, and maximum frame length, failing with
    /// [`ErrorKind::Config`] on any violation.
    pub fn new(
        log: AtomicBuffer,
        state: AtomicBuffer,
        default_header: &[u8],
        max_frame_length: usize,
    ) -> Result<Self, Error> {
        check_term_buffer(log.capacity())?;
        check_state_buffer(state.capacity())?;
        check_default_header(default_header.len())?;
        check_max_frame_length(max_frame_length, default_header.len())?;

        let capacity = log.capacity();
        let max_payload_length = max_frame_length - default_header.len();
        Ok(Self {
            log,
            state,
            default_header: default_header.to_vec(),
            capacity,
            max_frame_length,
            max_payload_length,
            max_message_length: max_payload_length * MAX_FRAGMENT_COUNT,
        })
    }

    /// Capacity of the log buffer in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Maximum length of a single frame, header included.
    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }

    /// Maximum payload carried by one frame.
    pub fn max_payload_length(&self) -> usize {
        self.max_payload_length
    }

    /// Maximum total length of one message across all of its fragments.
    pub fn max_message_length(&self) -> usize {
        self.max_message_length
    }

    /// Acquire-ordered read of the tail counter, pinned at `capacity`: a
    /// counter past the end only signals exhaustion internally.
    pub fn tail_volatile(&self) -> usize {
        let tail = self.state.get_u32_volatile(TAIL_COUNTER_OFFSET) as usize;
        tail.min(self.capacity)
    }

    /// Relaxed read of the tail counter, pinned at `capacity`.
    pub fn tail(&self) -> usize {
        let tail = self.state.get_u32_relaxed(TAIL_COUNTER_OFFSET) as usize;
        tail.min(self.capacity)
    }

    /// Copy `msg` into the log as one frame, or as an ordered run of
    /// fragment frames when it exceeds [`max_payload_length`](Self::max_payload_length).
    ///
    /// A length over [`max_message_length`](Self::max_message_length) is a
    /// caller error: no reservation is made and nothing is written.
    pub fn append(&self, msg: &[u8]) -> Result<AppendOutcome, Error> {
        if msg.len() > self.max_message_length {
            return Err(Error::new(ErrorKind::InvalidArgument).with_message(format!(
                "message length {} exceeds the maximum {}",
                msg.len(),
                self.max_message_length
            )));
        }

        if msg.len() <= self.max_payload_length {
            Ok(self.append_unfragmented(msg))
        } else {
            Ok(self.append_fragmented(msg))
        }
    }

    /// Reserve a single frame's span for in-place encoding. The frame's
    /// header is written but its length field is left unpublished until the
    /// returned handle commits.
    ///
    /// Claims never fragment: a length over
    /// [`max_payload_length`](Self::max_payload_length) is a caller error.
    pub fn claim(&self, length: usize) -> Result<ClaimOutcome<'_>, Error> {
        if length > self.max_payload_length {
            return Err(Error::new(ErrorKind::InvalidArgument).with_message(format!(
                "claim length {length} exceeds the maximum payload {}",
                self.max_payload_length
            )));
        }

        let header_length = self.default_header.len();
        let frame_length = header_length + length;
        let aligned_length = align_up(frame_length, FRAME_ALIGNMENT);

        let frame_offset = match self.reserve(aligned_length) {
            Reserved::At(offset) => offset,
            Reserved::Tripped => return Ok(ClaimOutcome::Tripped),
            Reserved::Failure => return Ok(ClaimOutcome::Failure),
        };

        self.put_header_template(frame_offset);
        self.log.put_u8(flags_offset(frame_offset), UNFRAGMENTED);
        self.log
            .put_u32(term_offset_offset(frame_offset), frame_offset as u32);

        Ok(ClaimOutcome::Claimed(BufferClaim::new(
            &self.log,
            frame_offset,
            frame_offset + header_length,
            length,
            frame_length,
        )))
    }

    fn append_unfragmented(&self, msg: &[u8]) -> AppendOutcome {
        let header_length = self.default_header.len();
        let frame_length = header_length + msg.len();
        let aligned_length = align_up(frame_length, FRAME_ALIGNMENT);

        let frame_offset = match self.reserve(aligned_length) {
            Reserved::At(offset) => offset,
            Reserved::Tripped => return AppendOutcome::Tripped,
            Reserved::Failure => return AppendOutcome::Failure,
        };

        self.write_frame(frame_offset, msg, UNFRAGMENTED, frame_length);
        AppendOutcome::Success
    }

    fn append_fragmented(&self, msg: &[u8]) -> AppendOutcome {
        let header_length = self.default_header.len();
        let full_fragments = msg.len() / self.max_payload_length;
        let remainder = msg.len() % self.max_payload_length;
        let required_capacity = full_fragments * self.max_frame_length
            + if remainder > 0 {
                align_up(header_length + remainder, FRAME_ALIGNMENT)
            } else {
                0
            };

        let tail = match self.reserve(required_capacity) {
            Reserved::At(offset) => offset,
            Reserved::Tripped => return AppendOutcome::Tripped,
            Reserved::Failure => return AppendOutcome::Failure,
        };

        let mut frame_offset = tail;
        let mut remaining = msg;
        while !remaining.is_empty() {
            let payload_length = remaining.len().min(self.max_payload_length);
            let (payload, rest) = remaining.split_at(payload_length);
            let frame_length = header_length + payload_length;

            let mut flags = 0u8;
            if frame_offset == tail {
                flags |= BEGIN_FRAGMENT;
            }
            if rest.is_empty() {
                flags |= END_FRAGMENT;
            }

            self.write_frame(frame_offset, payload, flags, frame_length);
            frame_offset += align_up(frame_length, FRAME_ALIGNMENT);
            remaining = rest;
        }

        AppendOutcome::Success
    }

    // The length field is written exactly once, by the release-ordered
    // publication store; the template copy skips it so a concurrent reader
    // can never mistake template bytes for a frame length.
    fn put_header_template(&self, frame_offset: usize) {
        self.log.put_bytes(
            frame_offset + LENGTH_FIELD_LENGTH,
            &self.default_header[LENGTH_FIELD_LENGTH..],
        );
    }

    // Header bytes, payload, flags, and term offset land before the length;
    // the release-ordered length write is what makes them visible.
    fn write_frame(&self, frame_offset: usize, payload: &[u8], flags: u8, frame_length: usize) {
        self.put_header_template(frame_offset);
        self.log
            .put_bytes(frame_offset + self.default_header.len(), payload);
        self.log.put_u8(flags_offset(frame_offset), flags);
        self.log
            .put_u32(term_offset_offset(frame_offset), frame_offset as u32);
        self.log
            .put_u32_ordered(length_offset(frame_offset), frame_length as u32);
    }

    fn reserve(&self, required_capacity: usize) -> Reserved {
        let tail = self
            .state
            .get_and_add_u32(TAIL_COUNTER_OFFSET, required_capacity as u32)
            as usize;

        if tail + required_capacity > self.capacity {
            if tail > self.capacity {
                return Reserved::Failure;
            }
            self.pad_to_end(tail);
            return Reserved::Tripped;
        }
        Reserved::At(tail)
    }

    // A reservation that straddles the end leaves [tail, capacity) dead; a
    // padding frame over that span keeps readers advancing to the end of
    // the term. A reservation landing exactly at capacity has nothing to pad.
    fn pad_to_end(&self, tail: usize) {
        let padding_length = self.capacity - tail;
        if padding_length == 0 {
            return;
        }
        // The remainder can be smaller than the header; never write past
        // the end of the term. An 8 byte remainder still holds the length,
        // flags, and type fields, which is all a reader needs to skip it.
        let header_copy = padding_length.min(self.default_header.len());
        self.log.put_bytes(
            tail + LENGTH_FIELD_LENGTH,
            &self.default_header[LENGTH_FIELD_LENGTH..header_copy],
        );
        self.log.put_u16(type_offset(tail), PADDING_FRAME_TYPE);
        self.log.put_u8(flags_offset(tail), UNFRAGMENTED);
        if padding_length >= BASE_HEADER_LENGTH {
            self.log.put_u32(term_offset_offset(tail), tail as u32);
        }
        self.log
            .put_u32_ordered(length_offset(tail), padding_length as u32);
    }
}
