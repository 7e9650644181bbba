//! Volatile striped hash index engine.

use crate::error::{CoreError, CoreResult};
use crate::index::traits::{IndexEngine, IndexKeyUpdater, Validator};
use parking_lot::RwLock;
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};

/// In-memory hash index split into independently locked stripes.
///
/// A key always maps to the same stripe, and every operation on a key runs
/// entirely under that stripe's lock. Reads share the lock; writes,
/// `update` and `validated_put` take it exclusively, so conditional updates
/// on one key cannot interleave. Keys in different stripes never contend.
///
/// # Example
///
/// ```rust
/// use keel_core::{HashIndexEngine, IndexEngine};
///
/// let engine: HashIndexEngine<String, u64> = HashIndexEngine::new(16);
/// engine.put("hits".into(), 1).unwrap();
/// engine.update("hits".into(), &|n: Option<&u64>| n.copied().unwrap_or(0) + 1).unwrap();
/// assert_eq!(engine.get(&"hits".into()).unwrap(), Some(2));
/// ```
pub struct HashIndexEngine<K, V> {
    stripes: Box<[RwLock<HashMap<K, V>>]>,
    mask: usize,
    hasher: RandomState,
}

impl<K, V> HashIndexEngine<K, V>
where
    K: Eq + Hash,
{
    /// Creates an empty engine with `stripes` locks, rounded up to a power
    /// of two (at least one).
    pub fn new(stripes: usize) -> Self {
        let count = stripes.max(1).next_power_of_two();
        let stripes = (0..count)
            .map(|_| RwLock::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            stripes,
            mask: count - 1,
            hasher: RandomState::new(),
        }
    }

    /// Creates an engine holding `entries`.
    pub fn with_entries<I>(stripes: usize, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let engine = Self::new(stripes);
        for (key, value) in entries {
            engine.stripe(&key).write().insert(key, value);
        }
        engine
    }

    /// Number of lock stripes.
    #[must_use]
    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    /// Returns the stripe that owns `key`.
    pub(crate) fn stripe(&self, key: &K) -> &RwLock<HashMap<K, V>> {
        let slot = self.hasher.hash_one(key) as usize & self.mask;
        &self.stripes[slot]
    }

    /// Number of entries.
    ///
    /// Stripes are counted one at a time, so the result is only a snapshot
    /// under concurrent writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stripes.iter().map(|s| s.read().len()).sum()
    }

    /// Returns true if the engine has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stripes.iter().all(|s| s.read().is_empty())
    }

    /// Total slot capacity across stripes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.stripes.iter().map(|s| s.read().capacity()).sum()
    }

    /// Reserves room for at least `total` entries, spread over the stripes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if the allocation is impossible.
    /// Stripes reserved before the failure keep their new capacity.
    pub fn reserve(&self, total: usize) -> CoreResult<()> {
        let per_stripe = total.div_ceil(self.stripes.len());
        for stripe in self.stripes.iter() {
            let mut map = stripe.write();
            let additional = per_stripe.saturating_sub(map.len());
            map.try_reserve(additional).map_err(|err| {
                CoreError::invalid_argument(format!("cannot reserve {total} entries: {err}"))
            })?;
        }
        Ok(())
    }

    /// Removes every entry.
    pub fn clear(&self) {
        for stripe in self.stripes.iter() {
            stripe.write().clear();
        }
    }
}

impl<K, V> HashIndexEngine<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Copies out every entry, stripe by stripe.
    #[must_use]
    pub fn entries(&self) -> Vec<(K, V)> {
        let mut out = Vec::new();
        for stripe in self.stripes.iter() {
            let map = stripe.read();
            out.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        out
    }
}

impl<K, V> IndexEngine<K, V> for HashIndexEngine<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> CoreResult<Option<V>> {
        Ok(self.stripe(key).read().get(key).cloned())
    }

    fn put(&self, key: K, value: V) -> CoreResult<()> {
        self.stripe(&key).write().insert(key, value);
        Ok(())
    }

    fn remove(&self, key: &K) -> CoreResult<bool> {
        Ok(self.stripe(key).write().remove(key).is_some())
    }

    fn update(&self, key: K, updater: &dyn IndexKeyUpdater<V>) -> CoreResult<()> {
        let mut map = self.stripe(&key).write();
        let value = updater.update(map.get(&key));
        map.insert(key, value);
        Ok(())
    }

    fn validated_put(
        &self,
        key: K,
        value: V,
        validator: &dyn Validator<K, V>,
    ) -> CoreResult<bool> {
        let mut map = self.stripe(&key).write();
        if !validator.validate(&key, map.get(&key), &value) {
            return Ok(false);
        }
        map.insert(key, value);
        Ok(true)
    }
}

impl<K, V> std::fmt::Debug for HashIndexEngine<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashIndexEngine")
            .field("stripes", &self.stripes.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::traits::ENGINE_VERSION;
    use crate::index::validators;
    use std::sync::Arc;
    use std::thread;

    fn engine() -> HashIndexEngine<String, u64> {
        HashIndexEngine::new(8)
    }

    #[test]
    fn put_and_get() {
        let e = engine();
        e.put("a".into(), 1).unwrap();
        assert_eq!(e.get(&"a".into()).unwrap(), Some(1));
        assert_eq!(e.get(&"b".into()).unwrap(), None);

        e.put("a".into(), 2).unwrap();
        assert_eq!(e.get(&"a".into()).unwrap(), Some(2));
        assert_eq!(e.len(), 1);
    }

    #[test]
    fn remove_reports_presence() {
        let e = engine();
        e.put("a".into(), 1).unwrap();
        assert!(e.remove(&"a".into()).unwrap());
        assert!(!e.remove(&"a".into()).unwrap());
        assert!(e.is_empty());
    }

    #[test]
    fn update_sees_absent_then_present() {
        let e = engine();
        let seen = parking_lot::Mutex::new(Vec::new());
        let updater = |current: Option<&u64>| {
            seen.lock().push(current.copied());
            current.copied().unwrap_or(10) * 2
        };
        e.update("k".into(), &updater).unwrap();
        e.update("k".into(), &updater).unwrap();

        assert_eq!(e.get(&"k".into()).unwrap(), Some(40));
        assert_eq!(*seen.lock(), vec![None, Some(20)]);
    }

    #[test]
    fn validated_put_mutates_only_when_approved() {
        let e = engine();
        assert!(e
            .validated_put("k".into(), 1, &validators::insert_if_absent())
            .unwrap());
        assert!(!e
            .validated_put("k".into(), 2, &validators::insert_if_absent())
            .unwrap());
        assert_eq!(e.get(&"k".into()).unwrap(), Some(1));

        assert!(!e
            .validated_put("k".into(), 3, &validators::replace_if_equals(9u64))
            .unwrap());
        assert!(e
            .validated_put("k".into(), 3, &validators::replace_if_equals(1u64))
            .unwrap());
        assert_eq!(e.get(&"k".into()).unwrap(), Some(3));
    }

    #[test]
    fn validator_sees_key_and_values() {
        let e = engine();
        e.put("k".into(), 5).unwrap();
        let check = |key: &String, old: Option<&u64>, proposed: &u64| {
            key == "k" && old == Some(&5) && *proposed == 6
        };
        assert!(e.validated_put("k".into(), 6, &check).unwrap());
    }

    #[test]
    fn stripes_round_up() {
        assert_eq!(HashIndexEngine::<u64, u64>::new(0).stripe_count(), 1);
        assert_eq!(HashIndexEngine::<u64, u64>::new(5).stripe_count(), 8);
        assert_eq!(HashIndexEngine::<u64, u64>::new(64).stripe_count(), 64);
    }

    #[test]
    fn with_entries_and_snapshot() {
        let e = HashIndexEngine::with_entries(4, (0u64..100).map(|i| (i, i * i)));
        assert_eq!(e.len(), 100);
        let mut entries = e.entries();
        entries.sort_unstable();
        assert_eq!(entries[9], (9, 81));

        e.clear();
        assert!(e.is_empty());
    }

    #[test]
    fn reserve_grows_capacity() {
        let e = HashIndexEngine::<u64, u64>::new(4);
        e.reserve(1000).unwrap();
        assert!(e.capacity() >= 1000);
    }

    #[test]
    fn impossible_reserve_is_an_error() {
        let e = HashIndexEngine::<u64, u64>::new(1);
        let err = e.reserve(usize::MAX).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
        e.put(1, 1).unwrap();
        assert_eq!(e.get(&1).unwrap(), Some(1));
    }

    #[test]
    fn default_engine_version() {
        assert_eq!(engine().engine_version(), ENGINE_VERSION);
    }

    #[test]
    fn concurrent_updates_lose_nothing() {
        let e = Arc::new(HashIndexEngine::<String, u64>::new(4));
        let threads = 8;
        let per_thread = 500;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let e = Arc::clone(&e);
                thread::spawn(move || {
                    let inc = |n: Option<&u64>| n.copied().unwrap_or(0) + 1;
                    for _ in 0..per_thread {
                        e.update("counter".into(), &inc).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(
            e.get(&"counter".into()).unwrap(),
            Some(threads * per_thread)
        );
    }

    #[test]
    fn concurrent_insert_if_absent_has_one_winner() {
        let e = Arc::new(HashIndexEngine::<u64, u64>::new(16));
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let e = Arc::clone(&e);
                thread::spawn(move || {
                    e.validated_put(7, t, &validators::insert_if_absent())
                        .unwrap()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
