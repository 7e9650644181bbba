//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory storage backend.
///
/// Clones share one buffer. A test can hand a clone to an operation log, keep
/// another, and later inspect or damage the bytes the log wrote, the same way
/// a crash would leave them on disk.
///
/// # Example
///
/// ```rust
/// use keel_storage::{InMemoryBackend, StorageBackend};
///
/// let handle = InMemoryBackend::new();
/// let mut writer = handle.clone();
/// writer.append(b"abc").unwrap();
/// assert_eq!(handle.data(), b"abc");
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend preloaded with `data`, e.g. a log image to recover.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Overwrites one byte in place. Used to simulate bit rot.
    ///
    /// Out-of-range positions are ignored.
    pub fn corrupt_byte(&self, position: usize, value: u8) {
        if let Some(byte) = self.data.write().get_mut(position) {
            *byte = value;
        }
    }

    /// Appends raw bytes without going through a log, e.g. a torn frame.
    pub fn extend(&self, bytes: &[u8]) {
        self.data.write().extend_from_slice(bytes);
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);

        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;

        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }

        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_running_offset() {
        let mut backend = InMemoryBackend::new();

        assert_eq!(backend.append(b"frame-1").unwrap(), 0);
        assert_eq!(backend.append(b"frame-2").unwrap(), 7);
        assert_eq!(backend.size().unwrap(), 14);
    }

    #[test]
    fn read_at_returns_appended_bytes() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"headerbody").unwrap();

        assert_eq!(backend.read_at(0, 6).unwrap(), b"header");
        assert_eq!(backend.read_at(6, 4).unwrap(), b"body");
        assert!(backend.read_at(10, 0).unwrap().is_empty());
    }

    #[test]
    fn read_past_end_is_rejected() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"short").unwrap();

        assert!(matches!(
            backend.read_at(3, 10),
            Err(StorageError::ReadPastEnd { size: 5, .. })
        ));
        assert!(matches!(
            backend.read_at(9, 0),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn read_from_returns_tail() {
        let backend = InMemoryBackend::with_data(b"0123456789".to_vec());
        assert_eq!(backend.read_from(7).unwrap(), b"789");
        assert!(backend.read_from(10).unwrap().is_empty());
    }

    #[test]
    fn clones_share_the_buffer() {
        let observer = InMemoryBackend::new();
        let mut writer = observer.clone();

        writer.append(b"shared").unwrap();
        assert_eq!(observer.data(), b"shared");

        observer.corrupt_byte(0, b'S');
        assert_eq!(writer.read_at(0, 1).unwrap(), b"S");
    }

    #[test]
    fn corrupt_out_of_range_is_ignored() {
        let backend = InMemoryBackend::with_data(vec![1, 2, 3]);
        backend.corrupt_byte(10, 0xFF);
        assert_eq!(backend.data(), vec![1, 2, 3]);
    }

    #[test]
    fn truncate_drops_tail() {
        let mut backend = InMemoryBackend::with_data(b"good|torn".to_vec());
        backend.truncate(4).unwrap();
        assert_eq!(backend.data(), b"good");
    }

    #[test]
    fn truncate_cannot_grow() {
        let mut backend = InMemoryBackend::with_data(vec![0; 4]);
        assert!(matches!(
            backend.truncate(8),
            Err(StorageError::TruncateBeyondEnd {
                requested: 8,
                size: 4
            })
        ));
    }
}
