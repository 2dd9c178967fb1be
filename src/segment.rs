// Segment and metadata-region geometry plus construction-time validation.
use crate::error::{Error, ErrorKind};
use crate::frame::{BASE_HEADER_LENGTH, FRAME_ALIGNMENT};

/// Minimum capacity of a term's log buffer.
pub const TERM_MIN_LENGTH: usize = 64 * 1024;

pub const CACHE_LINE_LENGTH: usize = 64;

/// Minimum capacity of the metadata (state) region.
pub const STATE_BUFFER_LENGTH: usize = 2 * CACHE_LINE_LENGTH;

/// Byte offset of the u32 tail counter within the metadata region.
pub const TAIL_COUNTER_OFFSET: usize = 0;

pub fn check_term_buffer(capacity: usize) -> Result<(), Error> {
    if capacity < TERM_MIN_LENGTH {
        return Err(Error::new(ErrorKind::Config).with_message(format!(
            "log buffer capacity {capacity} is below the minimum {TERM_MIN_LENGTH}"
        )));
    }
    if capacity % FRAME_ALIGNMENT != 0 {
        return Err(Error::new(ErrorKind::Config).with_message(format!(
            "log buffer capacity {capacity} is not a multiple of {FRAME_ALIGNMENT}"
        )));
    }
    Ok(())
}

pub fn check_state_buffer(capacity: usize) -> Result<(), Error> {
    if capacity < STATE_BUFFER_LENGTH {
        return Err(Error::new(ErrorKind::Config).with_message(format!(
            "state buffer capacity {capacity} is below the minimum {STATE_BUFFER_LENGTH}"
        )));
    }
    Ok(())
}

pub fn check_default_header(length: usize) -> Result<(), Error> {
    if length < BASE_HEADER_LENGTH {
        return Err(Error::new(ErrorKind::Config).with_message(format!(
            "default header length {length} is below the minimum {BASE_HEADER_LENGTH}"
        )));
    }
    if length % FRAME_ALIGNMENT != 0 {
        return Err(Error::new(ErrorKind::Config).with_message(format!(
            "default header length {length} is not a multiple of {FRAME_ALIGNMENT}"
        )));
    }
    Ok(())
}

pub fn check_max_frame_length(max_frame_length: usize, header_length: usize) -> Result<(), Error> {
    if max_frame_length % FRAME_ALIGNMENT != 0 {
        return Err(Error::new(ErrorKind::Config).with_message(format!(
            "max frame length {max_frame_length} is not a multiple of {FRAME_ALIGNMENT}"
        )));
    }
    if max_frame_length <= header_length {
        return Err(Error::new(ErrorKind::Config).with_message(format!(
            "max frame length {max_frame_length} leaves no room for a payload \
             after a {header_length} byte header"
        )));
    }
    Ok(())
}
