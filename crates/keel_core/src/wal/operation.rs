//! Serialization contract shared by every durable component record.

use crate::codec::{ByteReader, ByteSink, CursorWriter, OffsetWriter};
use crate::error::{CoreError, CoreResult};
use crate::types::OperationUnitId;
use bytes::BufMut;

/// A durable mutation record owned by one atomic operation.
///
/// Implementors describe their layout once through [`encode`](Self::encode)
/// and [`decode`](Self::decode); the provided writers and readers are built on
/// top, so the offset-addressed and cursor-style outputs cannot diverge.
///
/// # Invariants
///
/// - [`serialized_size`](Self::serialized_size) equals the number of bytes
///   `encode` writes. Log framing relies on it to size records without
///   encoding them twice.
/// - The first [`OperationUnitId::SERIALIZED_SIZE`] bytes are the record's
///   operation unit id.
pub trait ComponentOperation: Sized {
    /// The atomic operation this record belongs to.
    fn operation_unit_id(&self) -> OperationUnitId;

    /// Exact number of bytes [`encode`](Self::encode) writes.
    fn serialized_size(&self) -> usize;

    /// Checks that the record can be encoded (lengths fit their prefixes,
    /// required fields are set).
    fn validate(&self) -> CoreResult<()>;

    /// Writes the record. Only called on records that passed
    /// [`validate`](Self::validate).
    fn encode<S: ByteSink + ?Sized>(&self, sink: &mut S);

    /// Reads a record written by [`encode`](Self::encode).
    fn decode(reader: &mut ByteReader<'_>) -> CoreResult<Self>;

    /// Writes the record into `buf` at `offset` and returns the offset just
    /// past it.
    ///
    /// # Errors
    ///
    /// Fails without writing if the record is invalid or `buf` has fewer than
    /// `serialized_size()` bytes after `offset`.
    fn to_stream(&self, buf: &mut [u8], offset: usize) -> CoreResult<usize> {
        self.validate()?;
        let needed = self.serialized_size();
        let available = buf.len().saturating_sub(offset);
        if needed > available {
            return Err(CoreError::BufferTooSmall { needed, available });
        }

        let mut writer = OffsetWriter::new(buf, offset);
        self.encode(&mut writer);
        debug_assert_eq!(writer.position(), needed);
        Ok(writer.offset())
    }

    /// Writes the record through a cursor and returns the bytes written.
    ///
    /// # Errors
    ///
    /// Fails without writing if the record is invalid or the cursor cannot
    /// take `serialized_size()` more bytes.
    fn to_buf<B: BufMut + ?Sized>(&self, buf: &mut B) -> CoreResult<usize> {
        self.validate()?;
        let needed = self.serialized_size();
        let available = buf.remaining_mut();
        if needed > available {
            return Err(CoreError::BufferTooSmall { needed, available });
        }

        let mut writer = CursorWriter::new(buf);
        self.encode(&mut writer);
        debug_assert_eq!(writer.position(), needed);
        Ok(needed)
    }

    /// Reads a record from `buf` at `offset` and returns it with the offset
    /// just past it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Decode`] if the bytes are short or malformed.
    fn from_stream(buf: &[u8], offset: usize) -> CoreResult<(Self, usize)> {
        let mut reader = ByteReader::new(buf, offset);
        let record = Self::decode(&mut reader)?;
        Ok((record, reader.offset()))
    }

    /// Encodes the record into a new vector of exactly `serialized_size()`
    /// bytes.
    fn to_vec(&self) -> CoreResult<Vec<u8>> {
        let mut out = vec![0u8; self.serialized_size()];
        self.to_stream(&mut out, 0)?;
        Ok(out)
    }
}

/// Fails if `bytes` cannot carry a `u32` length prefix.
pub(crate) fn check_prefixable(field: &str, bytes: &[u8]) -> CoreResult<()> {
    if u32::try_from(bytes.len()).is_err() {
        return Err(CoreError::invalid_argument(format!(
            "{field} is {} bytes, longer than a u32 length prefix allows",
            bytes.len()
        )));
    }
    Ok(())
}
