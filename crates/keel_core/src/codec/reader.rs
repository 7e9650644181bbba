//! Read side of the codec.

use crate::error::{CoreError, CoreResult};

/// Bounds-checked cursor over an encoded byte slice.
///
/// Every read that would run past the end of the slice fails with
/// [`CoreError::Decode`]; nothing is ever read short.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader positioned at `offset` inside `buf`.
    #[must_use]
    pub fn new(buf: &'a [u8], offset: usize) -> Self {
        Self { buf, offset }
    }

    /// Absolute offset of the next unread byte.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left after the current offset.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.offset)
    }

    /// Reads `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(CoreError::decode(format!(
                "need {len} bytes at offset {}, only {} available",
                self.offset,
                self.remaining()
            )));
        }
        let bytes = &self.buf[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> CoreResult<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> CoreResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self) -> CoreResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64(&mut self) -> CoreResult<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Reads a `u32` length prefix and that many bytes.
    pub fn read_prefixed(&mut self) -> CoreResult<&'a [u8]> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> CoreResult<String> {
        let bytes = self.read_prefixed()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| CoreError::decode(format!("invalid UTF-8 in string field: {e}")))
    }

    /// Reads a presence flag and, when set, prefixed bytes.
    pub fn read_optional(&mut self) -> CoreResult<Option<&'a [u8]>> {
        match self.read_u8()? {
            0 => Ok(None),
            1 => self.read_prefixed().map(Some),
            flag => Err(CoreError::decode(format!("invalid presence flag {flag}"))),
        }
    }

    /// Fails unless every byte has been consumed.
    pub fn expect_end(&self) -> CoreResult<()> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(CoreError::decode(format!(
                "{extra} trailing bytes after offset {}",
                self.offset
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_fixed_width_fields() {
        let mut data = vec![0xFF];
        data.push(9);
        data.extend_from_slice(&300u32.to_le_bytes());
        data.extend_from_slice(&7u64.to_le_bytes());

        let mut reader = ByteReader::new(&data, 1);
        assert_eq!(reader.read_u8().unwrap(), 9);
        assert_eq!(reader.read_u32().unwrap(), 300);
        assert_eq!(reader.read_u64().unwrap(), 7);
        assert_eq!(reader.offset(), data.len());
        reader.expect_end().unwrap();
    }

    #[test]
    fn short_buffer_is_a_decode_error() {
        let data = [1u8, 2, 3];
        let mut reader = ByteReader::new(&data, 0);
        assert!(matches!(reader.read_u64(), Err(CoreError::Decode { .. })));
        // A failed read does not move the cursor.
        assert_eq!(reader.offset(), 0);
    }

    #[test]
    fn offset_past_end_is_a_decode_error() {
        let data = [1u8, 2];
        let mut reader = ByteReader::new(&data, 5);
        assert_eq!(reader.remaining(), 0);
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn prefix_longer_than_data_is_rejected() {
        let mut data = 10u32.to_le_bytes().to_vec();
        data.extend_from_slice(b"abc");
        assert!(ByteReader::new(&data, 0).read_prefixed().is_err());
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut data = 2u32.to_le_bytes().to_vec();
        data.extend_from_slice(&[0xC3, 0x28]);
        assert!(ByteReader::new(&data, 0).read_string().is_err());
    }

    #[test]
    fn optional_flag_must_be_zero_or_one() {
        assert_eq!(ByteReader::new(&[0], 0).read_optional().unwrap(), None);
        assert!(ByteReader::new(&[2], 0).read_optional().is_err());
    }

    #[test]
    fn trailing_bytes_are_reported() {
        let data = [0u8; 3];
        let mut reader = ByteReader::new(&data, 0);
        reader.read_u8().unwrap();
        assert!(reader.expect_end().is_err());
    }
}
