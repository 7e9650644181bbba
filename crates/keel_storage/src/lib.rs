//! # Keel Storage
//!
//! Byte-store backends that hold the Keel operation log.
//!
//! A backend is an append-only region of bytes with random reads. It knows
//! nothing about log frames or hash-table records; `keel_core` owns every
//! byte it writes.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - Shared in-process buffer, used by tests and
//!   ephemeral stores
//! - [`FileBackend`] - A single file accessed through OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use keel_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"frame").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"frame");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
