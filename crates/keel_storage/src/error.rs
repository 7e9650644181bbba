//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a storage backend.
///
/// Every variant is a storage fault from the point of view of the index
/// engines: it is surfaced to the caller and never retried here.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read touched bytes past the end of the backend.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The backend size at the time of the read.
        size: u64,
    },

    /// A truncation asked to grow the backend.
    #[error("cannot truncate to {requested} bytes: backend holds only {size}")]
    TruncateBeyondEnd {
        /// The requested new size.
        requested: u64,
        /// The backend size at the time of the call.
        size: u64,
    },
}
