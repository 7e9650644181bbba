//! Durable hash table backed by the operation log.

use crate::error::{CoreError, CoreResult};
use crate::index::hash::HashIndexEngine;
use crate::index::traits::{IndexEngine, IndexKey, IndexKeyUpdater, IndexValue, Validator};
use crate::types::{OperationUnitId, OperationUnitIds};
use crate::wal::{
    HashTableOperation, LocalHashTableOperation, OperationLog, PutEntry, RemoveEntry, ResizeTable,
};
use std::sync::Arc;

/// A [`HashIndexEngine`] whose mutations are logged before they are
/// visible.
///
/// Each mutation takes the key's stripe lock, builds the matching record,
/// appends it to the log and only then changes the in-memory map. If the
/// append fails the map is left as it was and the storage error is returned.
/// Removing an absent key and a rejected validated put write nothing.
///
/// Every call through the [`IndexEngine`] impl is its own atomic operation
/// with a fresh [`OperationUnitId`]. Use [`in_unit`](Self::in_unit) to group
/// several mutations under one id.
pub struct LocalHashTable<K, V> {
    name: String,
    engine: HashIndexEngine<K, V>,
    log: Arc<OperationLog>,
    ids: Arc<OperationUnitIds>,
}

impl<K: IndexKey, V: IndexValue> LocalHashTable<K, V> {
    /// Wraps `engine` as table `name`. The table's create record, if it
    /// needs one, is the caller's job.
    pub(crate) fn new(
        name: impl Into<String>,
        engine: HashIndexEngine<K, V>,
        log: Arc<OperationLog>,
        ids: Arc<OperationUnitIds>,
    ) -> Self {
        Self {
            name: name.into(),
            engine,
            log,
            ids,
        }
    }

    /// Table name as written in its log records.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.engine.len()
    }

    /// Returns true if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.engine.is_empty()
    }

    /// Copies out every entry.
    #[must_use]
    pub fn entries(&self) -> Vec<(K, V)> {
        self.engine.entries()
    }

    /// Returns a view whose mutations all carry `unit`.
    #[must_use]
    pub fn in_unit(&self, unit: OperationUnitId) -> UnitScope<'_, K, V> {
        UnitScope { table: self, unit }
    }

    /// Grows the table to hold at least `capacity` entries and logs the
    /// resize.
    ///
    /// Capacity is a hint: the memory is reserved first and only a resize
    /// that succeeded is logged.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `capacity` cannot be
    /// allocated, or the log error if the record cannot be written.
    pub fn reserve(&self, capacity: u64) -> CoreResult<()> {
        let old_capacity = self.engine.capacity() as u64;
        if capacity <= old_capacity {
            return Ok(());
        }
        let total = usize::try_from(capacity).map_err(|_| {
            CoreError::invalid_argument(format!("capacity {capacity} exceeds the address space"))
        })?;
        self.engine.reserve(total)?;

        let op = ResizeTable {
            base: self.base(self.ids.next_id()),
            old_capacity,
            new_capacity: capacity,
        };
        self.log.append(&op.into())?;
        tracing::debug!(table = %self.name, old_capacity, new_capacity = capacity, "resized table");
        Ok(())
    }

    fn base(&self, unit: OperationUnitId) -> LocalHashTableOperation {
        LocalHashTableOperation::new(unit, self.name.as_str())
    }

    fn put_in(&self, unit: OperationUnitId, key: K, value: V) -> CoreResult<()> {
        let mut map = self.engine.stripe(&key).write();
        let op = PutEntry {
            base: self.base(unit),
            key: key.to_bytes(),
            value: value.to_bytes(),
            old_value: map.get(&key).map(IndexValue::to_bytes),
        };
        self.log.append(&HashTableOperation::Put(op))?;
        map.insert(key, value);
        Ok(())
    }

    fn remove_in(&self, unit: OperationUnitId, key: &K) -> CoreResult<bool> {
        let mut map = self.engine.stripe(key).write();
        let Some(old) = map.get(key) else {
            return Ok(false);
        };
        let op = RemoveEntry {
            base: self.base(unit),
            key: key.to_bytes(),
            old_value: Some(old.to_bytes()),
        };
        self.log.append(&HashTableOperation::Remove(op))?;
        map.remove(key);
        Ok(true)
    }

    fn update_in(
        &self,
        unit: OperationUnitId,
        key: K,
        updater: &dyn IndexKeyUpdater<V>,
    ) -> CoreResult<()> {
        let mut map = self.engine.stripe(&key).write();
        let current = map.get(&key);
        let value = updater.update(current);
        let op = PutEntry {
            base: self.base(unit),
            key: key.to_bytes(),
            value: value.to_bytes(),
            old_value: current.map(IndexValue::to_bytes),
        };
        self.log.append(&HashTableOperation::Put(op))?;
        map.insert(key, value);
        Ok(())
    }

    fn validated_put_in(
        &self,
        unit: OperationUnitId,
        key: K,
        value: V,
        validator: &dyn Validator<K, V>,
    ) -> CoreResult<bool> {
        let mut map = self.engine.stripe(&key).write();
        let current = map.get(&key);
        if !validator.validate(&key, current, &value) {
            return Ok(false);
        }
        let op = PutEntry {
            base: self.base(unit),
            key: key.to_bytes(),
            value: value.to_bytes(),
            old_value: current.map(IndexValue::to_bytes),
        };
        self.log.append(&HashTableOperation::Put(op))?;
        map.insert(key, value);
        Ok(true)
    }
}

impl<K: IndexKey, V: IndexValue> IndexEngine<K, V> for LocalHashTable<K, V> {
    fn get(&self, key: &K) -> CoreResult<Option<V>> {
        self.engine.get(key)
    }

    fn put(&self, key: K, value: V) -> CoreResult<()> {
        self.put_in(self.ids.next_id(), key, value)
    }

    fn remove(&self, key: &K) -> CoreResult<bool> {
        self.remove_in(self.ids.next_id(), key)
    }

    fn update(&self, key: K, updater: &dyn IndexKeyUpdater<V>) -> CoreResult<()> {
        self.update_in(self.ids.next_id(), key, updater)
    }

    fn validated_put(
        &self,
        key: K,
        value: V,
        validator: &dyn Validator<K, V>,
    ) -> CoreResult<bool> {
        self.validated_put_in(self.ids.next_id(), key, value, validator)
    }
}

impl<K, V> std::fmt::Debug for LocalHashTable<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalHashTable")
            .field("name", &self.name)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

/// A [`LocalHashTable`] view that logs every mutation under one
/// [`OperationUnitId`].
///
/// Obtained from [`LocalHashTable::in_unit`]. Several scopes, even over
/// different tables, may share an id so replay tooling can tell which
/// records belong to the same operation.
#[derive(Debug)]
pub struct UnitScope<'a, K, V> {
    table: &'a LocalHashTable<K, V>,
    unit: OperationUnitId,
}

impl<K, V> UnitScope<'_, K, V> {
    /// The id every record from this scope carries.
    #[must_use]
    pub fn unit(&self) -> OperationUnitId {
        self.unit
    }
}

impl<K: IndexKey, V: IndexValue> IndexEngine<K, V> for UnitScope<'_, K, V> {
    fn get(&self, key: &K) -> CoreResult<Option<V>> {
        self.table.get(key)
    }

    fn put(&self, key: K, value: V) -> CoreResult<()> {
        self.table.put_in(self.unit, key, value)
    }

    fn remove(&self, key: &K) -> CoreResult<bool> {
        self.table.remove_in(self.unit, key)
    }

    fn update(&self, key: K, updater: &dyn IndexKeyUpdater<V>) -> CoreResult<()> {
        self.table.update_in(self.unit, key, updater)
    }

    fn validated_put(
        &self,
        key: K,
        value: V,
        validator: &dyn Validator<K, V>,
    ) -> CoreResult<bool> {
        self.table.validated_put_in(self.unit, key, value, validator)
    }
}
