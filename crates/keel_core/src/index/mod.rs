//! Index engines.
//!
//! [`IndexEngine`] is the contract every engine implements: point reads and
//! writes plus two atomic read-modify-write operations, `update` driven by an
//! [`IndexKeyUpdater`] and `validated_put` gated by a [`Validator`].
//!
//! # Engines
//!
//! - [`HashIndexEngine`]: volatile, lock-striped hash map
//! - [`LocalHashTable`]: a `HashIndexEngine` whose mutations go through the
//!   operation log first

mod hash;
mod table;
mod traits;
pub mod validators;

pub use hash::HashIndexEngine;
pub use table::{LocalHashTable, UnitScope};
pub use traits::{IndexEngine, IndexKey, IndexKeyUpdater, IndexValue, Validator, ENGINE_VERSION};
