//! Ready-made [`Validator`]s for common conditional puts.

use crate::index::traits::Validator;

/// Approves only when the key is absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsertIfAbsent;

impl<K, V> Validator<K, V> for InsertIfAbsent {
    fn validate(&self, _key: &K, old: Option<&V>, _proposed: &V) -> bool {
        old.is_none()
    }
}

/// Approves only when the current value equals the expected one
/// (compare-and-swap).
#[derive(Debug, Clone)]
pub struct ReplaceIfEquals<V>(V);

impl<K, V: PartialEq> Validator<K, V> for ReplaceIfEquals<V> {
    fn validate(&self, _key: &K, old: Option<&V>, _proposed: &V) -> bool {
        old == Some(&self.0)
    }
}

/// Approves every write.
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl<K, V> Validator<K, V> for Always {
    fn validate(&self, _key: &K, _old: Option<&V>, _proposed: &V) -> bool {
        true
    }
}

/// Unique-insert validator.
#[must_use]
pub fn insert_if_absent() -> InsertIfAbsent {
    InsertIfAbsent
}

/// Compare-and-swap validator against `expected`.
#[must_use]
pub fn replace_if_equals<V>(expected: V) -> ReplaceIfEquals<V> {
    ReplaceIfEquals(expected)
}

/// Validator that approves everything.
#[must_use]
pub fn always() -> Always {
    Always
}
