//! Framed, checksummed operation log.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::wal::hash_table::HashTableOperation;
use crate::wal::iterator::LogScanner;
use keel_storage::StorageBackend;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Magic bytes at the start of every frame.
pub const LOG_MAGIC: [u8; 4] = *b"KHWL";

/// Current frame format version.
pub const LOG_VERSION: u16 = 1;

/// magic (4) + version (2) + kind (1) + length (4) + header crc32 (4) = 15 bytes
pub const HEADER_SIZE: usize = 15;

/// Offset of the header checksum, which covers the bytes before it.
pub(crate) const HEADER_CRC_AT: usize = 11;

/// Trailing CRC32 size.
pub const CRC_SIZE: usize = 4;

/// Computes the CRC32 a frame stores.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Encodes `op` as one complete frame.
///
/// ```text
/// | magic (4) | version u16 | kind u8 | length u32 | header crc32 | body | crc32 |
/// ```
///
/// The header CRC covers the eleven bytes before it, so a damaged length is
/// never trusted. The trailing CRC covers everything before it.
///
/// # Errors
///
/// Returns [`CoreError::InvalidArgument`] if the record is invalid or its
/// body is larger than `max_record_size`.
pub fn encode_frame(op: &HashTableOperation, max_record_size: usize) -> CoreResult<Vec<u8>> {
    let body_len = op.serialized_size();
    if body_len > max_record_size {
        return Err(CoreError::invalid_argument(format!(
            "record body is {body_len} bytes, limit is {max_record_size}"
        )));
    }
    let len = u32::try_from(body_len)
        .map_err(|_| CoreError::invalid_argument("record body exceeds 4 GiB"))?;

    let mut data = Vec::with_capacity(HEADER_SIZE + body_len + CRC_SIZE);
    data.extend_from_slice(&LOG_MAGIC);
    data.extend_from_slice(&LOG_VERSION.to_le_bytes());
    data.push(op.kind().as_byte());
    data.extend_from_slice(&len.to_le_bytes());
    let header_crc = compute_crc32(&data[..HEADER_CRC_AT]);
    data.extend_from_slice(&header_crc.to_le_bytes());
    op.to_buf(&mut data)?;

    let crc = compute_crc32(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok(data)
}

/// Append-only log of hash-table records over a storage backend.
///
/// Appends are serialized by an internal mutex, so each frame lands
/// contiguously even with many writers.
///
/// A failed append is rolled back to the previous log end. If the rollback
/// itself fails the log is poisoned: every later append fails, since a new
/// frame behind leftover bytes would be unreachable on replay.
pub struct OperationLog {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_append: bool,
    max_record_size: usize,
    poisoned_at: AtomicU64,
}

const NOT_POISONED: u64 = u64::MAX;

impl OperationLog {
    /// Wraps `backend` using the log settings from `config`.
    pub fn new(backend: Box<dyn StorageBackend>, config: &Config) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_append: config.sync_on_append,
            max_record_size: config.max_record_size,
            poisoned_at: AtomicU64::new(NOT_POISONED),
        }
    }

    /// Appends one record and returns the offset of its frame.
    ///
    /// When `sync_on_append` is set the backend is synced before this
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be framed or the backend write
    /// fails. A failed write is cut back off the log; if that is impossible
    /// the log is poisoned and this and every later append fail with
    /// [`CoreError::LogPoisoned`].
    pub fn append(&self, op: &HashTableOperation) -> CoreResult<u64> {
        let frame = encode_frame(op, self.max_record_size)?;

        let mut backend = self.backend.lock();
        self.check_poisoned()?;
        let start = backend.size()?;

        let written = backend.append(&frame).and_then(|offset| {
            if self.sync_on_append {
                backend.sync()?;
            }
            Ok(offset)
        });
        let offset = match written {
            Ok(offset) => offset,
            Err(err) => {
                self.roll_back(&mut **backend, start);
                return Err(err.into());
            }
        };
        drop(backend);

        tracing::trace!(
            offset,
            kind = op.kind().label(),
            table = op.name(),
            unit = %op.operation_unit_id(),
            "appended log record"
        );
        Ok(offset)
    }

    /// Returns whether a failed append could not be rolled back.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned_at.load(Ordering::Acquire) != NOT_POISONED
    }

    fn check_poisoned(&self) -> CoreResult<()> {
        match self.poisoned_at.load(Ordering::Acquire) {
            NOT_POISONED => Ok(()),
            offset => Err(CoreError::LogPoisoned { offset }),
        }
    }

    // Cuts whatever a failed append left behind. Caller holds the lock.
    fn roll_back(&self, backend: &mut dyn StorageBackend, start: u64) {
        let restored = backend.size().and_then(|size| {
            if size > start {
                backend.truncate(start)?;
            }
            Ok(())
        });
        if let Err(err) = restored {
            tracing::error!(offset = start, error = %err, "failed append could not be rolled back");
            self.poisoned_at.store(start, Ordering::Release);
        }
    }

    /// Flushes buffered frames.
    pub fn flush(&self) -> CoreResult<()> {
        self.backend.lock().flush()?;
        Ok(())
    }

    /// Forces frames and the log length to disk.
    pub fn sync(&self) -> CoreResult<()> {
        self.backend.lock().sync()?;
        Ok(())
    }

    /// Current log size in bytes.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Largest body this log writes or accepts on read.
    #[must_use]
    pub fn max_record_size(&self) -> usize {
        self.max_record_size
    }

    /// Returns a scanner over every frame from the start of the log.
    ///
    /// The scanner holds the log lock; appends block until it is dropped.
    pub fn scan(&self) -> CoreResult<LogScanner<'_>> {
        LogScanner::new(self.backend.lock(), 0, self.max_record_size)
    }

    /// Discards everything at and after `offset`.
    pub fn truncate(&self, offset: u64) -> CoreResult<()> {
        let mut backend = self.backend.lock();
        backend.truncate(offset)?;
        backend.sync()?;
        Ok(())
    }
}

impl std::fmt::Debug for OperationLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationLog")
            .field("sync_on_append", &self.sync_on_append)
            .field("max_record_size", &self.max_record_size)
            .field("poisoned", &self.is_poisoned())
            .finish_non_exhaustive()
    }
}
