//! Property-based test generators using proptest.
//!
//! Strategies here only produce records that encode successfully: table
//! names are non-empty and every byte field is far below the `u32` prefix
//! limit.

use keel_core::{
    CreateTable, HashTableOperation, LocalHashTableOperation, OperationUnitId, PutEntry,
    RemoveEntry, ResizeTable,
};
use proptest::prelude::*;

/// Strategy for operation unit ids.
pub fn unit_id_strategy() -> impl Strategy<Value = OperationUnitId> {
    (any::<u64>(), any::<u64>()).prop_map(|(epoch, counter)| OperationUnitId::new(epoch, counter))
}

/// Strategy for table names, including multi-byte UTF-8.
pub fn table_name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[a-z][a-z0-9_]{0,31}").expect("Invalid regex"),
        prop::string::string_regex("[α-ω]{1,8}").expect("Invalid regex"),
    ]
}

/// Strategy for encoded keys and values.
pub fn bytes_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

fn base_strategy() -> impl Strategy<Value = LocalHashTableOperation> {
    (unit_id_strategy(), table_name_strategy())
        .prop_map(|(unit, name)| LocalHashTableOperation::new(unit, name))
}

/// Strategy for any hash-table record.
pub fn hash_table_operation_strategy() -> impl Strategy<Value = HashTableOperation> {
    prop_oneof![
        1 => (base_strategy(), any::<u32>()).prop_map(|(base, engine_version)| {
            CreateTable { base, engine_version }.into()
        }),
        4 => (
            base_strategy(),
            bytes_strategy(),
            bytes_strategy(),
            prop::option::of(bytes_strategy()),
        )
            .prop_map(|(base, key, value, old_value)| {
                PutEntry { base, key, value, old_value }.into()
            }),
        2 => (base_strategy(), bytes_strategy(), prop::option::of(bytes_strategy()))
            .prop_map(|(base, key, old_value)| RemoveEntry { base, key, old_value }.into()),
        1 => (base_strategy(), any::<u64>(), any::<u64>()).prop_map(
            |(base, old_capacity, new_capacity)| {
                ResizeTable { base, old_capacity, new_capacity }.into()
            }
        ),
    ]
}

/// A mutation against a `u64 -> u64` table, used to drive a table and a
/// model side by side.
#[derive(Debug, Clone)]
pub enum TableMutation {
    /// Store a value.
    Put {
        /// Key
        key: u64,
        /// Value
        value: u64,
    },
    /// Remove a key.
    Remove {
        /// Key
        key: u64,
    },
    /// Add to the current value (absent counts as zero).
    Add {
        /// Key
        key: u64,
        /// Amount to add
        delta: u64,
    },
    /// Insert only if the key is absent.
    InsertIfAbsent {
        /// Key
        key: u64,
        /// Value
        value: u64,
    },
}

/// Strategy for table mutations over a small key space, so keys repeat.
pub fn table_mutation_strategy() -> impl Strategy<Value = TableMutation> {
    let key = 0u64..16;
    prop_oneof![
        3 => (key.clone(), any::<u64>()).prop_map(|(key, value)| TableMutation::Put { key, value }),
        2 => key.clone().prop_map(|key| TableMutation::Remove { key }),
        2 => (key.clone(), 0u64..1000).prop_map(|(key, delta)| TableMutation::Add { key, delta }),
        1 => (key, any::<u64>())
            .prop_map(|(key, value)| TableMutation::InsertIfAbsent { key, value }),
    ]
}

/// Strategy for a sequence of table mutations.
pub fn mutation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<TableMutation>> {
    prop::collection::vec(table_mutation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
