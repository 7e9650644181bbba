//! # Keel Core
//!
//! Index engines and the write-ahead log that makes them durable.
//!
//! This crate provides:
//! - [`IndexEngine`], the contract for key/value indexes with atomic
//!   `update` and `validated_put`
//! - [`HashIndexEngine`] and its durable form [`LocalHashTable`]
//! - The hash-table log records ([`HashTableOperation`]) and the
//!   [`ComponentOperation`] serialization contract they share
//! - Log framing, scanning and crash recovery
//! - [`IndexStore`], which ties a log to a set of named tables
//!
//! ## Example
//!
//! ```rust
//! use keel_core::{validators, Config, IndexEngine, IndexStore};
//! use keel_storage::InMemoryBackend;
//!
//! let store = IndexStore::open(Box::new(InMemoryBackend::new()), Config::default()).unwrap();
//! let usernames = store.open_table::<String, u64>("usernames").unwrap();
//!
//! assert!(usernames
//!     .validated_put("ada".into(), 1, &validators::insert_if_absent())
//!     .unwrap());
//! assert!(!usernames
//!     .validated_put("ada".into(), 2, &validators::insert_if_absent())
//!     .unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
mod config;
mod error;
mod index;
mod store;
mod types;
pub mod wal;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use index::{
    validators, HashIndexEngine, IndexEngine, IndexKey, IndexKeyUpdater, IndexValue,
    LocalHashTable, UnitScope, Validator, ENGINE_VERSION,
};
pub use store::{IndexStore, LOG_FILE_NAME};
pub use types::{OperationUnitId, OperationUnitIds};
pub use wal::{
    ComponentOperation, CreateTable, HashTableOperation, HashTableOperationKind,
    LocalHashTableOperation, PutEntry, RecoveryReport, RemoveEntry, ResizeTable,
};

/// Crate version, as reported by tooling.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
