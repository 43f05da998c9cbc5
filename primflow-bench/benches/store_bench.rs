//! Graph store benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use primflow_core::{PrimitiveChain, StateDefinition};
use primflow_storage::{GraphStore, StoredState};
use tempfile::TempDir;

fn state(i: usize) -> StoredState {
    StateDefinition::new(format!("state_{}", i))
        .with_chain(PrimitiveChain::new(["validateOrder", "checkInventory"], 1))
        .with_main_action("processPayment")
        .with_transitions(format!("state_{}", i + 1), "failed")
        .into()
}

fn bench_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_save");

    for size in [10usize, 100] {
        let dir = TempDir::new().unwrap();
        let store = GraphStore::open(dir.path()).unwrap();
        store.save_all((0..size).map(state)).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(store.save(state(0)).unwrap()));
        });
    }

    group.finish();
}

fn bench_catalog(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let store = GraphStore::open(dir.path()).unwrap();
    store.save_all((0..100).map(state)).unwrap();

    c.bench_function("store_catalog_100", |b| {
        b.iter(|| black_box(store.catalog().unwrap()));
    });
}

criterion_group!(benches, bench_save, bench_catalog);
criterion_main!(benches);
