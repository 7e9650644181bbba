//! Error types for Keel core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Keel core operations.
///
/// A rejected validated put and an absent key are not errors; they are
/// reported through `Ok(false)` and `Ok(None)`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The storage medium failed. Never retried by the engine.
    #[error("storage error: {0}")]
    Storage(#[from] keel_storage::StorageError),

    /// A failed append could not be rolled back, so the log refuses writes.
    #[error("operation log is poisoned: a failed append at offset {offset} could not be rolled back")]
    LogPoisoned {
        /// Log end before the failed append.
        offset: u64,
    },

    /// I/O error outside a storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record bytes are malformed or truncated.
    #[error("decode error: {message}")]
    Decode {
        /// What could not be decoded.
        message: String,
    },

    /// The log is corrupted before its tail.
    #[error("WAL corruption at offset {offset}: {message}")]
    WalCorruption {
        /// Offset of the offending frame.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// A frame checksum does not match its contents.
    #[error("checksum mismatch at offset {offset}: stored {expected:08x}, computed {actual:08x}")]
    ChecksumMismatch {
        /// Offset of the frame.
        offset: u64,
        /// Checksum stored in the frame.
        expected: u32,
        /// Checksum computed over the frame.
        actual: u32,
    },

    /// An offset-addressed writer was given a slice that is too short.
    #[error("buffer too small: need {needed} bytes, {available} available")]
    BufferTooSmall {
        /// Bytes the record needs from the write offset.
        needed: usize,
        /// Bytes left in the slice from the write offset.
        available: usize,
    },

    /// Persisted data uses a format or engine version this build cannot read.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the mismatch.
        message: String,
    },

    /// The operation is not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Why the operation was refused.
        message: String,
    },

    /// A caller-supplied value cannot be encoded.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Which argument was rejected and why.
        message: String,
    },
}

impl CoreError {
    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a WAL corruption error for the frame at `offset`.
    pub fn wal_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::WalCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Returns true for errors that mean the log content is damaged.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. } | Self::WalCorruption { .. } | Self::ChecksumMismatch { .. }
        )
    }
}
