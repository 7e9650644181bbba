//! Index engine contract and key/value traits.

use crate::error::{CoreError, CoreResult};
use std::hash::Hash;

/// Format version of the hash index engines in this crate.
///
/// Persisted in each table's create record; a table written by a different
/// version is refused on open.
pub const ENGINE_VERSION: u32 = 0;

/// A key that can be indexed and logged.
///
/// `from_bytes(&k.to_bytes())` must return a key equal to `k`.
pub trait IndexKey: Clone + Eq + Hash + Send + Sync + 'static {
    /// Serializes the key to bytes.
    fn to_bytes(&self) -> Vec<u8>;

    /// Deserializes the key from bytes.
    fn from_bytes(bytes: &[u8]) -> CoreResult<Self>;
}

/// A value that can be stored and logged.
pub trait IndexValue: Clone + Send + Sync + 'static {
    /// Serializes the value to bytes.
    fn to_bytes(&self) -> Vec<u8>;

    /// Deserializes the value from bytes.
    fn from_bytes(bytes: &[u8]) -> CoreResult<Self>;
}

fn fixed<const N: usize>(bytes: &[u8], what: &str) -> CoreResult<[u8; N]> {
    bytes.try_into().map_err(|_| {
        CoreError::invalid_format(format!(
            "expected {N} bytes for {what}, got {}",
            bytes.len()
        ))
    })
}

fn utf8(bytes: &[u8]) -> CoreResult<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| CoreError::invalid_format("invalid UTF-8"))
}

// Integers are big-endian. Byte order matches numeric order for unsigned
// keys only; negative `i64` keys sort after positive ones.

impl IndexKey for i64 {
    fn to_bytes(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        Ok(i64::from_be_bytes(fixed(bytes, "i64")?))
    }
}

impl IndexKey for u64 {
    fn to_bytes(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        Ok(u64::from_be_bytes(fixed(bytes, "u64")?))
    }
}

impl IndexKey for String {
    fn to_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        utf8(bytes)
    }
}

impl IndexKey for Vec<u8> {
    fn to_bytes(&self) -> Vec<u8> {
        self.clone()
    }

    fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        Ok(bytes.to_vec())
    }
}

impl IndexValue for i64 {
    fn to_bytes(&self) -> Vec<u8> {
        IndexKey::to_bytes(self)
    }

    fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        <Self as IndexKey>::from_bytes(bytes)
    }
}

impl IndexValue for u64 {
    fn to_bytes(&self) -> Vec<u8> {
        IndexKey::to_bytes(self)
    }

    fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        <Self as IndexKey>::from_bytes(bytes)
    }
}

impl IndexValue for String {
    fn to_bytes(&self) -> Vec<u8> {
        IndexKey::to_bytes(self)
    }

    fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        <Self as IndexKey>::from_bytes(bytes)
    }
}

impl IndexValue for Vec<u8> {
    fn to_bytes(&self) -> Vec<u8> {
        self.clone()
    }

    fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        Ok(bytes.to_vec())
    }
}

/// Decides whether a proposed value may replace the current one.
///
/// Called while the engine holds the key's lock. Implementations must not
/// call back into the engine.
pub trait Validator<K, V> {
    /// Returns true to let `proposed` replace `old` under `key`.
    fn validate(&self, key: &K, old: Option<&V>, proposed: &V) -> bool;
}

impl<K, V, F> Validator<K, V> for F
where
    F: Fn(&K, Option<&V>, &V) -> bool,
{
    fn validate(&self, key: &K, old: Option<&V>, proposed: &V) -> bool {
        self(key, old, proposed)
    }
}

/// Computes a key's new value from its current one.
///
/// Same locking rule as [`Validator`].
pub trait IndexKeyUpdater<V> {
    /// Returns the value to store given the current value, if any.
    fn update(&self, current: Option<&V>) -> V;
}

impl<V, F> IndexKeyUpdater<V> for F
where
    F: Fn(Option<&V>) -> V,
{
    fn update(&self, current: Option<&V>) -> V {
        self(current)
    }
}

/// Key/value index with atomic conditional updates.
///
/// All operations on one key are linearizable: `update` and `validated_put`
/// read, decide and write without any other operation on that key in
/// between. Operations on different keys may proceed in parallel.
pub trait IndexEngine<K, V>: Send + Sync {
    /// Returns the value stored under `key`.
    fn get(&self, key: &K) -> CoreResult<Option<V>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: K, value: V) -> CoreResult<()>;

    /// Removes `key`. Returns true if it was present.
    fn remove(&self, key: &K) -> CoreResult<bool>;

    /// Atomically replaces the value under `key` with `updater`'s result.
    fn update(&self, key: K, updater: &dyn IndexKeyUpdater<V>) -> CoreResult<()>;

    /// Stores `value` only if `validator` approves. Returns whether it was
    /// stored; a rejection leaves the engine unchanged.
    fn validated_put(
        &self,
        key: K,
        value: V,
        validator: &dyn Validator<K, V>,
    ) -> CoreResult<bool>;

    /// Format version of this engine.
    fn engine_version(&self) -> u32 {
        ENGINE_VERSION
    }
}
