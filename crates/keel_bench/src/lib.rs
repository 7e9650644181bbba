//! Benchmark utilities.

use keel_core::{HashTableOperation, LocalHashTableOperation, OperationUnitId, PutEntry};
use keel_core::{Config, IndexEngine, IndexStore};
use keel_storage::InMemoryBackend;

/// Deterministic data of the given size.
pub fn patterned_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// A put record with a `key_size`-byte key and `value_size`-byte value and
/// before-image.
pub fn sample_put(key_size: usize, value_size: usize) -> HashTableOperation {
    PutEntry {
        base: LocalHashTableOperation::new(OperationUnitId::new(1, 1), "bench_table"),
        key: patterned_data(key_size),
        value: patterned_data(value_size),
        old_value: Some(patterned_data(value_size)),
    }
    .into()
}

/// Config for benches: no per-record flush.
pub fn bench_config() -> Config {
    Config::default().sync_on_append(false)
}

/// Builds an in-memory log holding `records` puts over `keys` distinct keys
/// and returns its backend.
pub fn populated_log(records: u64, keys: u64) -> InMemoryBackend {
    let backend = InMemoryBackend::new();
    let store = IndexStore::open(Box::new(backend.clone()), bench_config())
        .expect("open bench store");
    let table = store
        .open_table::<u64, Vec<u8>>("bench_table")
        .expect("open bench table");
    let value = patterned_data(64);
    for i in 0..records {
        table.put(i % keys, value.clone()).expect("put");
    }
    backend
}
