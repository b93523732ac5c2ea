//! Performance benchmarks for bucketdb
//!
//! Run with: cargo bench

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use bucketdb::merkle::{sha256, BucketTree, TreeConfig, WriteSet};
use bucketdb::store::{Batch, KvStore, MemoryStore};

/// Deterministic pseudo-random write-set of `count` entries.
fn make_write_set(count: usize, seed: u8) -> WriteSet {
    (0..count)
        .map(|i| {
            let mut preimage = vec![seed];
            preimage.extend_from_slice(&i.to_be_bytes());
            let key = sha256(&preimage);
            (key.as_bytes().to_vec(), Some(key.as_bytes().to_vec()))
        })
        .collect()
}

/// Benchmark prepare + commit of a full write-set on a fresh tree.
fn bench_fresh_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("BucketTree/fresh_commit");

    for size in [100, 1_000, 10_000].iter() {
        let write_set = make_write_set(*size, 0x01);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let store = Arc::new(MemoryStore::new());
                let mut tree = BucketTree::new(store, TreeConfig::default());
                tree.init(None).unwrap();
                tree.prepare(black_box(&write_set)).unwrap();
                let mut batch = Batch::new();
                tree.commit(&mut batch).unwrap()
            })
        });
    }

    group.finish();
}

/// Benchmark a small incremental commit on top of a populated tree.
fn bench_incremental_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("BucketTree/incremental_commit");

    for delta in [1, 16, 128].iter() {
        let store = Arc::new(MemoryStore::new());
        let mut tree = BucketTree::new(store.clone(), TreeConfig::default());
        tree.init(None).unwrap();
        tree.prepare(&make_write_set(50_000, 0x01)).unwrap();
        let mut batch = Batch::new();
        let root = tree.commit(&mut batch).unwrap();
        store.write(&batch).unwrap();

        let write_set = make_write_set(*delta, 0x02);
        group.throughput(Throughput::Elements(*delta as u64));
        group.bench_with_input(BenchmarkId::from_parameter(delta), delta, |b, _| {
            b.iter(|| {
                tree.init(Some(root)).unwrap();
                tree.prepare(black_box(&write_set)).unwrap();
                let mut batch = Batch::new();
                tree.commit(&mut batch).unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fresh_commit, bench_incremental_commit);
criterion_main!(benches);
