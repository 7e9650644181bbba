//! Write side of the codec.

use bytes::BufMut;

/// Destination for encoded bytes.
///
/// Implementors only provide [`put_slice`](Self::put_slice) and
/// [`position`](Self::position); the integer helpers are shared so every
/// sink lays out fields the same way.
pub trait ByteSink {
    /// Writes `bytes` at the current position and advances it.
    fn put_slice(&mut self, bytes: &[u8]);

    /// Number of bytes written through this sink so far.
    fn position(&self) -> usize;

    /// Writes one byte.
    fn put_u8(&mut self, value: u8) {
        self.put_slice(&[value]);
    }

    /// Writes a little-endian `u32`.
    fn put_u32(&mut self, value: u32) {
        self.put_slice(&value.to_le_bytes());
    }

    /// Writes a little-endian `u64`.
    fn put_u64(&mut self, value: u64) {
        self.put_slice(&value.to_le_bytes());
    }

    /// Writes a `u32` length prefix followed by `bytes`.
    ///
    /// Callers validate that `bytes.len()` fits in a `u32` before encoding.
    fn put_prefixed(&mut self, bytes: &[u8]) {
        debug_assert!(u32::try_from(bytes.len()).is_ok());
        self.put_u32(bytes.len() as u32);
        self.put_slice(bytes);
    }

    /// Writes a presence flag, then the prefixed bytes when present.
    fn put_optional(&mut self, bytes: Option<&[u8]>) {
        match bytes {
            Some(bytes) => {
                self.put_u8(1);
                self.put_prefixed(bytes);
            }
            None => self.put_u8(0),
        }
    }
}

/// Writes into a mutable slice starting at a fixed offset.
///
/// The caller checks capacity up front; writing past the end of the slice
/// panics.
#[derive(Debug)]
pub struct OffsetWriter<'a> {
    buf: &'a mut [u8],
    start: usize,
    offset: usize,
}

impl<'a> OffsetWriter<'a> {
    /// Creates a writer that starts at `offset` inside `buf`.
    pub fn new(buf: &'a mut [u8], offset: usize) -> Self {
        Self {
            buf,
            start: offset,
            offset,
        }
    }

    /// Absolute offset of the next byte to be written.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl ByteSink for OffsetWriter<'_> {
    fn put_slice(&mut self, bytes: &[u8]) {
        let end = self.offset + bytes.len();
        self.buf[self.offset..end].copy_from_slice(bytes);
        self.offset = end;
    }

    fn position(&self) -> usize {
        self.offset - self.start
    }
}

/// Writes through a [`BufMut`] cursor, which tracks its own position.
#[derive(Debug)]
pub struct CursorWriter<'a, B: BufMut + ?Sized> {
    buf: &'a mut B,
    written: usize,
}

impl<'a, B: BufMut + ?Sized> CursorWriter<'a, B> {
    /// Wraps a cursor.
    pub fn new(buf: &'a mut B) -> Self {
        Self { buf, written: 0 }
    }
}

impl<B: BufMut + ?Sized> ByteSink for CursorWriter<'_, B> {
    fn put_slice(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
        self.written += bytes.len();
    }

    fn position(&self) -> usize {
        self.written
    }
}

/// A sink that only counts bytes.
///
/// Used to check a record's declared size against what it actually encodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SizeCounter {
    count: usize,
}

impl SizeCounter {
    /// Creates a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ByteSink for SizeCounter {
    fn put_slice(&mut self, bytes: &[u8]) {
        self.count += bytes.len();
    }

    fn position(&self) -> usize {
        self.count
    }
}
