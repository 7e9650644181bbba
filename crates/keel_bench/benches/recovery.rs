//! Replay benchmarks.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use keel_bench::{bench_config, populated_log};
use keel_core::IndexStore;
use keel_storage::InMemoryBackend;

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");
    group.sample_size(20);

    for records in [1_000u64, 10_000].iter() {
        let bytes = populated_log(*records, 512).data();
        group.throughput(Throughput::Elements(*records));
        group.bench_with_input(BenchmarkId::from_parameter(records), &bytes, |b, bytes| {
            b.iter(|| {
                let backend = InMemoryBackend::with_data(bytes.clone());
                let store = IndexStore::open(Box::new(backend), bench_config()).unwrap();
                let table = store.open_table::<u64, Vec<u8>>("bench_table").unwrap();
                assert_eq!(table.len(), 512);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_replay);
criterion_main!(benches);
