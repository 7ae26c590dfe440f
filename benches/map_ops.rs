//! Benchmark suite for snapmap operations.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use snapmap::SnapMap;
use std::{sync::Arc, thread, time::Duration};

/// Benchmark insertion of fresh keys into an empty map.
///
/// Every insertion takes the lock, and the reads in between drive promotions.
fn store_fresh_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_fresh");

    for size in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let map: SnapMap<u64, String> = SnapMap::new();
                for i in 0..size {
                    map.store(black_box(i), black_box(format!("value-{}", i)));
                    let _ = map.load(&black_box(i / 2));
                }
            });
        });
    }
    group.finish();
}

/// Benchmark reads of promoted keys. This is the lock-free path.
fn load_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");

    for size in [100, 1000, 10000].iter() {
        let map: SnapMap<u64, Arc<String>> = SnapMap::new();
        for i in 0..*size {
            map.store(i, Arc::new(format!("value-{}", i)));
        }
        let _ = map.iter();

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                for i in 0..size {
                    let _ = map.load(&black_box(i));
                }
            });
        });
    }
    group.finish();
}

/// Benchmark reads from several threads while one thread keeps overwriting
/// existing keys.
fn concurrent_load_benchmark(c: &mut Criterion) {
    const SIZE: u64 = 1000;
    const READERS: u64 = 4;

    let mut group = c.benchmark_group("concurrent_load");
    let map: Arc<SnapMap<u64, u64>> = Arc::new(SnapMap::new());
    for i in 0..SIZE {
        map.store(i, i);
    }
    let _ = map.iter();

    group.throughput(Throughput::Elements(SIZE * READERS));
    group.bench_function("4_readers_1_writer", |b| {
        b.iter(|| {
            let writer = {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    for i in 0..SIZE {
                        map.store(i, i + 1);
                    }
                })
            };
            let readers: Vec<_> = (0..READERS)
                .map(|_| {
                    let map = Arc::clone(&map);
                    thread::spawn(move || {
                        for i in 0..SIZE {
                            let _ = map.load(&black_box(i));
                        }
                    })
                })
                .collect();
            for t in readers.into_iter().chain(std::iter::once(writer)) {
                t.join().expect("Thread failed");
            }
        });
    });
    group.finish();
}

/// Benchmark overwriting existing keys, which goes through the lock-free path.
fn swap_existing_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("swap_existing");

    for size in [100, 1000, 10000].iter() {
        let map: SnapMap<u64, u64> = SnapMap::new();
        for i in 0..*size {
            map.store(i, i);
        }
        let _ = map.iter();

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                for i in 0..size {
                    let _ = map.swap(black_box(i), black_box(i * 2));
                }
            });
        });
    }
    group.finish();
}

/// Benchmark batch updates of 16 keys against maps of different sizes.
///
/// A batch rebuilds the snapshot, so its cost grows with the map size.
fn swap_multiple_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("swap_multiple");

    for size in [100, 1000, 10000].iter() {
        let map: SnapMap<u64, u64> = SnapMap::new();
        for i in 0..*size {
            map.store(i, i);
        }

        group.throughput(Throughput::Elements(16));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut round = 0;
            b.iter(|| {
                round += 1;
                let _ = map.swap_multiple((0..16).map(|i| (black_box(i * size / 16), round)));
            });
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(100);
    targets = store_fresh_benchmark, load_benchmark, concurrent_load_benchmark,
              swap_existing_benchmark, swap_multiple_benchmark
}

criterion_main!(benches);
