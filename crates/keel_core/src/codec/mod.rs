//! Fixed-width binary encoding shared by every log record.
//!
//! Records encode themselves once against [`ByteSink`]. The two public
//! writers are thin adapters over it:
//!
//! - [`OffsetWriter`] writes into a caller slice starting at an offset
//! - [`CursorWriter`] writes through any [`bytes::BufMut`] cursor
//!
//! so both produce the same bytes for the same record by construction.
//! All integers are little-endian.

mod reader;
mod sink;

pub use reader::ByteReader;
pub use sink::{ByteSink, CursorWriter, OffsetWriter, SizeCounter};

/// Width of the length prefix in front of variable-size fields.
pub const LEN_PREFIX_SIZE: usize = 4;

/// Encoded size of a length-prefixed byte field.
#[must_use]
pub const fn prefixed_size(len: usize) -> usize {
    LEN_PREFIX_SIZE + len
}
