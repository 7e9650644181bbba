//! Core type definitions for Keel.

use crate::codec::{ByteReader, ByteSink};
use crate::error::CoreResult;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one atomic operation spanning one or more log records.
///
/// Every record written for the same operation carries a bit-identical id.
/// The `epoch` changes on every store open and the `counter` increases within
/// an epoch, so an id from an operation interrupted by a crash is never handed
/// out again.
///
/// Encoded as `epoch u64 | counter u64`, little-endian, 16 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationUnitId {
    epoch: u64,
    counter: u64,
}

impl OperationUnitId {
    /// Encoded size in bytes.
    pub const SERIALIZED_SIZE: usize = 16;

    /// Creates an id from its two parts.
    #[must_use]
    pub const fn new(epoch: u64, counter: u64) -> Self {
        Self { epoch, counter }
    }

    /// Restart marker of the process run that issued this id.
    #[must_use]
    pub const fn epoch(self) -> u64 {
        self.epoch
    }

    /// Position of this id within its epoch.
    #[must_use]
    pub const fn counter(self) -> u64 {
        self.counter
    }

    /// Writes the id to `sink`.
    pub fn encode<S: ByteSink + ?Sized>(&self, sink: &mut S) {
        sink.put_u64(self.epoch);
        sink.put_u64(self.counter);
    }

    /// Reads an id written by [`encode`](Self::encode).
    pub fn decode(reader: &mut ByteReader<'_>) -> CoreResult<Self> {
        let epoch = reader.read_u64()?;
        let counter = reader.read_u64()?;
        Ok(Self { epoch, counter })
    }
}

impl fmt::Display for OperationUnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit:{}.{}", self.epoch, self.counter)
    }
}

/// Thread-safe source of [`OperationUnitId`]s for one epoch.
#[derive(Debug)]
pub struct OperationUnitIds {
    epoch: u64,
    next: AtomicU64,
}

impl OperationUnitIds {
    /// Creates a generator for `epoch`, starting at counter 1.
    #[must_use]
    pub const fn new(epoch: u64) -> Self {
        Self {
            epoch,
            next: AtomicU64::new(1),
        }
    }

    /// Creates a generator whose epoch follows the newest one seen in a log.
    #[must_use]
    pub fn after(max_seen_epoch: Option<u64>) -> Self {
        Self::new(max_seen_epoch.map_or(1, |epoch| epoch.saturating_add(1)))
    }

    /// Issues the next id.
    pub fn next_id(&self) -> OperationUnitId {
        let counter = self.next.fetch_add(1, Ordering::Relaxed);
        OperationUnitId::new(self.epoch, counter)
    }

    /// Epoch shared by every id from this generator.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }
}
