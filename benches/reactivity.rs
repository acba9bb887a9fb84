//! Hot-path benchmarks for the reactive layer.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use lumen::reactive::{batch, cell, effect, Store};

fn bench_cell_write_notify(c: &mut Criterion) {
    c.bench_function("cell_write_one_subscriber", |b| {
        let value = cell(0u64);
        let value_in = value.clone();
        let _fx = effect(move || {
            black_box(value_in.get());
        });
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            value.set(n);
        });
    });

    c.bench_function("cell_write_ten_subscribers", |b| {
        let value = cell(0u64);
        let effects: Vec<_> = (0..10)
            .map(|_| {
                let value_in = value.clone();
                effect(move || {
                    black_box(value_in.get());
                })
            })
            .collect();
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            value.set(n);
        });
        drop(effects);
    });
}

fn bench_batched_writes(c: &mut Criterion) {
    c.bench_function("batch_100_writes_one_flush", |b| {
        let value = cell(0u64);
        let value_in = value.clone();
        let _fx = effect(move || {
            black_box(value_in.get());
        });
        let mut n = 0u64;
        b.iter(|| {
            batch(|| {
                for _ in 0..100 {
                    n += 1;
                    value.set(n);
                }
            });
        });
    });
}

fn bench_untracked_read(c: &mut Criterion) {
    c.bench_function("cell_get_untracked", |b| {
        let value = cell(42u64);
        b.iter(|| black_box(value.get()));
    });
}

fn bench_store_access(c: &mut Criterion) {
    c.bench_function("store_set_existing_key", |b| {
        let store = Store::new();
        store.set("key", json!(0));
        let store_in = store.clone();
        let _fx = effect(move || {
            black_box(store_in.get("key"));
        });
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            store.set("key", json!(n));
        });
    });
}

criterion_group!(
    benches,
    bench_cell_write_notify,
    bench_batched_writes,
    bench_untracked_read,
    bench_store_access
);
criterion_main!(benches);
