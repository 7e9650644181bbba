//! Frame-by-frame scanner over the operation log.
//!
//! The scanner separates a *torn tail* (the bytes a crash left behind while a
//! frame was being appended) from corruption earlier in the log:
//!
//! - fewer bytes than a header, or a verified header declaring a frame longer
//!   than what is left, is a torn tail
//! - a tail made only of zero bytes is a torn tail (pre-allocated space)
//! - a header failing its checksum, or declaring a body over the size limit,
//!   is fatal: an append only ever leaves a prefix of a correct header
//! - a frame that fits but fails validation is a torn tail only when it ends
//!   exactly at the end of the log; anywhere else it is fatal
//! - bad magic cannot be sized, so it is fatal unless the rest is zeros
//!
//! A torn tail ends iteration cleanly and is reported by
//! [`LogScanner::torn_tail`]. Fatal corruption is yielded once as an error.

use crate::error::{CoreError, CoreResult};
use crate::wal::hash_table::{HashTableOperation, HashTableOperationKind};
use crate::wal::log::{
    compute_crc32, CRC_SIZE, HEADER_CRC_AT, HEADER_SIZE, LOG_MAGIC, LOG_VERSION,
};
use keel_storage::StorageBackend;
use parking_lot::MutexGuard;
use std::fmt;

/// Why the tail of a log was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TornTailCause {
    /// Fewer bytes than a frame header.
    ShortHeader,
    /// The header declares more bytes than the log holds.
    ShortFrame,
    /// The tail is all zero bytes.
    ZeroFill,
    /// The final frame is complete but invalid.
    InvalidFinalFrame(String),
}

impl fmt::Display for TornTailCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortHeader => f.write_str("incomplete frame header"),
            Self::ShortFrame => f.write_str("incomplete frame"),
            Self::ZeroFill => f.write_str("zero-filled tail"),
            Self::InvalidFinalFrame(reason) => write!(f, "invalid final frame: {reason}"),
        }
    }
}

/// The discarded end of a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TornTail {
    /// Offset of the first discarded byte, which is also the valid end.
    pub offset: u64,
    /// Number of discarded bytes.
    pub discarded: u64,
    /// Why the bytes were discarded.
    pub cause: TornTailCause,
}

/// Streams `(offset, record)` pairs from a locked log backend.
pub struct LogScanner<'a> {
    backend: MutexGuard<'a, Box<dyn StorageBackend>>,
    total_size: u64,
    offset: u64,
    max_record_size: usize,
    torn_tail: Option<TornTail>,
    finished: bool,
}

impl<'a> LogScanner<'a> {
    /// Creates a scanner starting at `start_offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be read.
    pub fn new(
        backend: MutexGuard<'a, Box<dyn StorageBackend>>,
        start_offset: u64,
        max_record_size: usize,
    ) -> CoreResult<Self> {
        let total_size = backend.size()?;
        Ok(Self {
            backend,
            total_size,
            offset: start_offset,
            max_record_size,
            torn_tail: None,
            finished: false,
        })
    }

    /// Offset just past the last frame yielded so far.
    ///
    /// After iteration ends without error this is where clean data stops.
    #[must_use]
    pub fn valid_end(&self) -> u64 {
        self.offset
    }

    /// Log size when the scanner was created.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// The torn tail found at the end of the log, if any.
    #[must_use]
    pub fn torn_tail(&self) -> Option<&TornTail> {
        self.torn_tail.as_ref()
    }

    fn stop_torn(&mut self, cause: TornTailCause) {
        self.torn_tail = Some(TornTail {
            offset: self.offset,
            discarded: self.total_size - self.offset,
            cause,
        });
        self.finished = true;
    }

    fn rest_is_zero(&self) -> CoreResult<bool> {
        let rest = self.backend.read_from(self.offset)?;
        Ok(rest.iter().all(|&b| b == 0))
    }

    fn read_next(&mut self) -> CoreResult<Option<(u64, HashTableOperation)>> {
        let start = self.offset;
        let remaining = self.total_size - start;
        if remaining == 0 {
            self.finished = true;
            return Ok(None);
        }
        if remaining < HEADER_SIZE as u64 {
            self.stop_torn(TornTailCause::ShortHeader);
            return Ok(None);
        }

        let header = self.backend.read_at(start, HEADER_SIZE)?;
        if header[0..4] != LOG_MAGIC {
            if self.rest_is_zero()? {
                self.stop_torn(TornTailCause::ZeroFill);
                return Ok(None);
            }
            self.finished = true;
            return Err(CoreError::wal_corruption(start, "invalid frame magic"));
        }

        let body_len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]);
        let frame_len = (HEADER_SIZE + CRC_SIZE) as u64 + u64::from(body_len);

        let stored = u32::from_le_bytes([
            header[HEADER_CRC_AT],
            header[HEADER_CRC_AT + 1],
            header[HEADER_CRC_AT + 2],
            header[HEADER_CRC_AT + 3],
        ]);
        if stored != compute_crc32(&header[..HEADER_CRC_AT]) {
            // The length is unverified; it only decides whether this looks
            // like the final frame.
            if frame_len == remaining {
                self.stop_torn(TornTailCause::InvalidFinalFrame(
                    "frame header checksum mismatch".to_string(),
                ));
                return Ok(None);
            }
            self.finished = true;
            return Err(CoreError::wal_corruption(
                start,
                "frame header checksum mismatch",
            ));
        }

        if u64::from(body_len) > self.max_record_size as u64 {
            self.finished = true;
            return Err(CoreError::wal_corruption(
                start,
                format!(
                    "record body of {body_len} bytes exceeds limit {}",
                    self.max_record_size
                ),
            ));
        }

        if frame_len > remaining {
            self.stop_torn(TornTailCause::ShortFrame);
            return Ok(None);
        }

        let frame = self.backend.read_at(start, frame_len as usize)?;
        match self.check_frame(start, &frame) {
            Ok(op) => {
                self.offset += frame_len;
                Ok(Some((start, op)))
            }
            Err(err) if start + frame_len == self.total_size => {
                self.stop_torn(TornTailCause::InvalidFinalFrame(err.to_string()));
                Ok(None)
            }
            Err(err) => {
                self.finished = true;
                Err(err)
            }
        }
    }

    /// Validates a complete frame and decodes its body.
    fn check_frame(&self, start: u64, frame: &[u8]) -> CoreResult<HashTableOperation> {
        let version = u16::from_le_bytes([frame[4], frame[5]]);
        if version != LOG_VERSION {
            return Err(CoreError::wal_corruption(
                start,
                format!("unsupported frame version {version}"),
            ));
        }

        let kind = HashTableOperationKind::from_byte(frame[6]).ok_or_else(|| {
            CoreError::wal_corruption(start, format!("unknown record kind {}", frame[6]))
        })?;

        let crc_at = frame.len() - CRC_SIZE;
        let stored = u32::from_le_bytes([
            frame[crc_at],
            frame[crc_at + 1],
            frame[crc_at + 2],
            frame[crc_at + 3],
        ]);
        let computed = compute_crc32(&frame[..crc_at]);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                offset: start,
                expected: stored,
                actual: computed,
            });
        }

        HashTableOperation::decode(kind, &frame[HEADER_SIZE..crc_at])
            .map_err(|err| CoreError::wal_corruption(start, err.to_string()))
    }
}

impl Iterator for LogScanner<'_> {
    type Item = CoreResult<(u64, HashTableOperation)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        self.read_next().transpose()
    }
}

impl fmt::Debug for LogScanner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogScanner")
            .field("offset", &self.offset)
            .field("total_size", &self.total_size)
            .field("torn_tail", &self.torn_tail)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::types::OperationUnitId;
    use crate::wal::hash_table::{LocalHashTableOperation, RemoveEntry};
    use crate::wal::log::{encode_frame, OperationLog};
    use keel_storage::InMemoryBackend;

    fn remove(counter: u64) -> HashTableOperation {
        RemoveEntry {
            base: LocalHashTableOperation::new(OperationUnitId::new(2, counter), "idx"),
            key: counter.to_le_bytes().to_vec(),
            old_value: Some(vec![1, 2, 3]),
        }
        .into()
    }

    fn frame_len() -> u64 {
        encode_frame(&remove(0), usize::MAX).unwrap().len() as u64
    }

    /// Log with `n` records plus a handle to its raw bytes.
    fn log_with(n: u64) -> (OperationLog, InMemoryBackend) {
        let backend = InMemoryBackend::new();
        let log = OperationLog::new(Box::new(backend.clone()), &Config::default());
        for i in 0..n {
            log.append(&remove(i)).unwrap();
        }
        (log, backend)
    }

    type Drained = (CoreResult<Vec<(u64, HashTableOperation)>>, u64, Option<TornTail>);

    fn drain(log: &OperationLog) -> Drained {
        let mut scanner = log.scan().unwrap();
        let records = scanner.by_ref().collect::<CoreResult<Vec<_>>>();
        (records, scanner.valid_end(), scanner.torn_tail().cloned())
    }

    #[test]
    fn empty_log() {
        let (log, _) = log_with(0);
        let (records, end, torn) = drain(&log);
        assert!(records.unwrap().is_empty());
        assert_eq!(end, 0);
        assert!(torn.is_none());
    }

    #[test]
    fn clean_log_yields_every_record() {
        let (log, _) = log_with(3);
        let (records, end, torn) = drain(&log);
        let records = records.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].0, 2 * frame_len());
        assert_eq!(records[2].1, remove(2));
        assert_eq!(end, 3 * frame_len());
        assert!(torn.is_none());
    }

    #[test]
    fn partial_header_is_torn_tail() {
        let (log, backend) = log_with(2);
        backend.extend(&LOG_MAGIC[..3]);

        let (records, end, torn) = drain(&log);
        assert_eq!(records.unwrap().len(), 2);
        let torn = torn.unwrap();
        assert_eq!(torn.offset, end);
        assert_eq!(torn.discarded, 3);
        assert_eq!(torn.cause, TornTailCause::ShortHeader);
    }

    #[test]
    fn partial_frame_is_torn_tail() {
        let (log, backend) = log_with(2);
        let frame = encode_frame(&remove(9), usize::MAX).unwrap();
        backend.extend(&frame[..frame.len() - 5]);

        let (records, _, torn) = drain(&log);
        assert_eq!(records.unwrap().len(), 2);
        assert_eq!(torn.unwrap().cause, TornTailCause::ShortFrame);
    }

    #[test]
    fn zero_tail_is_torn_tail() {
        let (log, backend) = log_with(1);
        backend.extend(&[0u8; 64]);

        let (records, end, torn) = drain(&log);
        assert_eq!(records.unwrap().len(), 1);
        assert_eq!(end, frame_len());
        let torn = torn.unwrap();
        assert_eq!(torn.discarded, 64);
        assert_eq!(torn.cause, TornTailCause::ZeroFill);
    }

    #[test]
    fn bad_checksum_on_last_frame_is_torn_tail() {
        let (log, backend) = log_with(3);
        let last_body_byte = (3 * frame_len() - CRC_SIZE as u64 - 1) as usize;
        backend.corrupt_byte(last_body_byte, 0xEE);

        let (records, end, torn) = drain(&log);
        assert_eq!(records.unwrap().len(), 2);
        assert_eq!(end, 2 * frame_len());
        assert!(matches!(
            torn.unwrap().cause,
            TornTailCause::InvalidFinalFrame(_)
        ));
    }

    #[test]
    fn bad_checksum_mid_log_is_fatal() {
        let (log, backend) = log_with(3);
        let body_byte = (frame_len() + HEADER_SIZE as u64 + 2) as usize;
        backend.corrupt_byte(body_byte, 0xEE);

        let mut scanner = log.scan().unwrap();
        assert!(scanner.next().unwrap().is_ok());
        let err = scanner.next().unwrap().unwrap_err();
        assert!(matches!(err, CoreError::ChecksumMismatch { offset, .. } if offset == frame_len()));
        assert!(scanner.next().is_none());
        assert!(scanner.torn_tail().is_none());
    }

    #[test]
    fn bad_magic_mid_log_is_fatal() {
        let (log, backend) = log_with(2);
        backend.corrupt_byte(0, b'X');

        let (records, _, _) = drain(&log);
        let err = records.unwrap_err();
        assert!(matches!(err, CoreError::WalCorruption { offset: 0, .. }));
        assert!(err.is_corruption());
    }

    #[test]
    fn garbage_tail_without_magic_is_fatal() {
        let (log, backend) = log_with(1);
        backend.extend(&[0xFFu8; 32]);

        let (records, _, _) = drain(&log);
        assert!(records.unwrap_err().is_corruption());
    }

    #[test]
    fn unknown_kind_mid_log_is_fatal() {
        let (log, backend) = log_with(2);
        backend.corrupt_byte(6, 99);

        let (records, _, _) = drain(&log);
        assert!(matches!(
            records.unwrap_err(),
            CoreError::WalCorruption { offset: 0, .. }
        ));
    }

    #[test]
    fn damaged_length_mid_log_is_fatal() {
        let (log, backend) = log_with(4);
        // High byte of the second frame's length.
        backend.corrupt_byte((frame_len() + 10) as usize, 0x7F);

        let (records, end, torn) = drain(&log);
        let err = records.unwrap_err();
        assert!(err.is_corruption());
        assert!(matches!(err, CoreError::WalCorruption { offset, .. } if offset == frame_len()));
        assert_eq!(end, frame_len());
        assert!(torn.is_none());
    }

    #[test]
    fn small_length_damage_mid_log_is_fatal() {
        let (log, backend) = log_with(4);
        // Grows the first frame by one byte, still under the size limit.
        let low = (frame_len() - (HEADER_SIZE + CRC_SIZE) as u64 + 1) as u8;
        backend.corrupt_byte(7, low);

        let (records, _, torn) = drain(&log);
        assert!(matches!(
            records.unwrap_err(),
            CoreError::WalCorruption { offset: 0, .. }
        ));
        assert!(torn.is_none());
    }

    #[test]
    fn damaged_header_on_last_frame_is_torn_tail() {
        let (log, backend) = log_with(2);
        backend.corrupt_byte((frame_len() + 6) as usize, 99);

        let (records, end, torn) = drain(&log);
        assert_eq!(records.unwrap().len(), 1);
        assert_eq!(end, frame_len());
        assert!(matches!(
            torn.unwrap().cause,
            TornTailCause::InvalidFinalFrame(_)
        ));
    }

    #[test]
    fn oversized_body_is_rejected_on_read() {
        let backend = InMemoryBackend::new();
        let writer = OperationLog::new(Box::new(backend.clone()), &Config::default());
        writer.append(&remove(1)).unwrap();
        writer.append(&remove(2)).unwrap();

        let reader = OperationLog::new(
            Box::new(backend),
            &Config::default().max_record_size(8),
        );
        let (records, _, _) = drain(&reader);
        assert!(records.unwrap_err().is_corruption());
    }
}
