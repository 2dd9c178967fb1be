// Frame header layout constants and alignment/offset helpers.
//
// A frame is a header followed by payload, padded out to FRAME_ALIGNMENT.
// Field offsets are relative to the frame start; the type and term-offset
// fields are little-endian. The length field at +0 doubles as the
// publication flag: readers treat a zero length as "not yet available". It
// is written last with release ordering and, like the tail counter, is
// native-endian in-memory state rather than a wire field.

/// Alignment unit for frame starts and reservation sizes.
pub const FRAME_ALIGNMENT: usize = 8;

/// Minimum header length. Default header templates must be at least this
/// long and a multiple of [`FRAME_ALIGNMENT`].
pub const BASE_HEADER_LENGTH: usize = 12;

/// Frame type reserved for padding frames emitted when a reservation would
/// straddle the end of the term. Data frames use non-zero types.
pub const PADDING_FRAME_TYPE: u16 = 0;

/// Flag bit set on the first frame of a fragmented message.
pub const BEGIN_FRAGMENT: u8 = 0b1000_0000;

/// Flag bit set on the last frame of a fragmented message.
pub const END_FRAGMENT: u8 = 0b0100_0000;

/// Flags value for a message that fits in a single frame.
pub const UNFRAGMENTED: u8 = BEGIN_FRAGMENT | END_FRAGMENT;

/// How many frames a single message may span. Bounds the whole-message
/// reservation made by the fragmented append path.
pub const MAX_FRAGMENT_COUNT: usize = 16;

const LENGTH_FIELD_OFFSET: usize = 0;
pub(crate) const LENGTH_FIELD_LENGTH: usize = 4;
const FLAGS_FIELD_OFFSET: usize = 4;
const TYPE_FIELD_OFFSET: usize = 6;
const TERM_OFFSET_FIELD_OFFSET: usize = 8;

/// Byte offset of the 4-byte length field for a frame starting at
/// `frame_offset`. Written last, with release ordering, to publish the frame.
#[inline]
pub fn length_offset(frame_offset: usize) -> usize {
    frame_offset + LENGTH_FIELD_OFFSET
}

/// Byte offset of the 1-byte flags field.
#[inline]
pub fn flags_offset(frame_offset: usize) -> usize {
    frame_offset + FLAGS_FIELD_OFFSET
}

/// Byte offset of the 2-byte frame type field.
#[inline]
pub fn type_offset(frame_offset: usize) -> usize {
    frame_offset + TYPE_FIELD_OFFSET
}

/// Byte offset of the 4-byte term-relative offset field.
#[inline]
pub fn term_offset_offset(frame_offset: usize) -> usize {
    frame_offset + TERM_OFFSET_FIELD_OFFSET
}

/// Round `value` up to the next multiple of `alignment`.
/// `alignment` must be a power of two.
#[inline]
pub fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}
