//! # Keel Testkit
//!
//! Test utilities for Keel.
//!
//! This crate provides:
//! - Test fixtures with reopen support for recovery tests
//! - Property-based test generators using proptest
//! - A crash-simulating storage backend
//! - Concurrency stress runners
//!
//! ## Usage
//!
//! ```rust
//! use keel_core::IndexEngine;
//! use keel_testkit::prelude::*;
//!
//! let ts = TestStore::memory();
//! {
//!     let table = ts.open_table::<u64, u64>("t").unwrap();
//!     table.put(1, 1).unwrap();
//! }
//! let ts = ts.reopen();
//! assert_eq!(ts.recovery_report().records_applied, 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
