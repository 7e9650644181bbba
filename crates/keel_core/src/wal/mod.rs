//! Write-ahead log for hash-table indexes.
//!
//! Every mutation of a durable table is appended here before it becomes
//! visible. On open the log is replayed to rebuild the tables.
//!
//! ## Frame Format
//!
//! ```text
//! | magic "KHWL" (4) | version (2) | kind (1) | length (4) | hdr crc (4) | body (N) | crc (4) |
//! ```
//!
//! The header checksum protects the length, so a damaged length in the
//! middle of the log is never mistaken for a short final frame.
//!
//! The body is a [`HashTableOperation`] of the given kind. Bodies never carry
//! their own kind tag.
//!
//! ## Recovery Policy
//!
//! ### Tolerated (clean end of log)
//!
//! - **Short header**: fewer than 15 bytes left
//! - **Short frame**: a verified header declares a length that runs past
//!   the end
//! - **Zero fill**: the rest of the log is zero bytes
//! - **Invalid final frame**: the last frame fits but fails its checksum or
//!   decoding
//!
//! These are what a crash during an append leaves behind. The partial frame
//! is discarded and, by default, truncated away.
//!
//! ### Fatal (open fails)
//!
//! - Any invalid frame followed by more data
//! - A header that fails its checksum, unless its frame would end exactly at
//!   the end of the log
//! - A verified header declaring a body over `max_record_size`
//! - Bad magic followed by anything but zeros
//!
//! ## Invariants
//!
//! - Frames are never modified after they are written
//! - Replay is idempotent
//! - Records of one atomic operation share an [`OperationUnitId`](crate::OperationUnitId)

mod hash_table;
mod iterator;
mod log;
mod operation;
mod recovery;

pub use hash_table::{
    CreateTable, HashTableOperation, HashTableOperationKind, LocalHashTableOperation, PutEntry,
    RemoveEntry, ResizeTable,
};
pub use iterator::{LogScanner, TornTail, TornTailCause};
pub use log::{
    compute_crc32, encode_frame, OperationLog, CRC_SIZE, HEADER_SIZE, LOG_MAGIC, LOG_VERSION,
};
pub use operation::ComponentOperation;
pub use recovery::{replay, RecoveredTable, RecoveredTables, RecoveryReport};
