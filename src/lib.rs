//! Purpose: Wait-free append path for shared-memory log buffer segments.
//! Exports: frame layout, segment geometry, `AtomicBuffer`, `TermAppender`,
//! `BufferClaim`, and mmap-backed `Segment` files.
//! Role: Producer-side core of a message transport; readers, term rotation,
//! and flow control live in collaborating crates.
//! Invariants: the tail counter only grows, reserved spans never overlap,
//! and a frame's release-ordered length write is its sole publication signal.
pub mod appender;
pub mod buffer;
pub mod claim;
pub mod error;
pub mod frame;
pub mod region;
pub mod segment;

pub use appender::{AppendOutcome, ClaimOutcome, TermAppender};
pub use buffer::{AlignedBuffer, AtomicBuffer};
pub use claim::BufferClaim;
pub use error::{Error, ErrorKind};
pub use region::{Segment, SegmentOptions};
