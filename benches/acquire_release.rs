// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

use std::sync::Arc;

use bocache::{CacheConfig, CacheManager, MockDevice, Target};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn cache() -> CacheManager<MockDevice> {
    let device = Arc::new(MockDevice::default());
    CacheManager::new(device, CacheConfig::default()).unwrap()
}

fn bench_hit_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("hit_round_trip");
    for size in [4096u64, 64 * 1024, 1 << 20] {
        let manager = cache();
        let warm = manager.acquire(size, Target::Gpu).unwrap();
        manager.release(warm);
        for target in [Target::Cpu, Target::Gpu] {
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", target), size),
                &size,
                |b, &size| {
                    b.iter(|| {
                        let bo = manager.acquire(black_box(size), target).unwrap();
                        manager.release(bo);
                    })
                },
            );
        }
    }
    group.finish();
}

fn bench_fresh_allocation(c: &mut Criterion) {
    let manager = cache();
    let oversized = manager.bucket_size(manager.bucket_count() - 1) + 1;
    c.bench_function("fresh_uncached", |b| {
        b.iter(|| {
            let bo = manager.acquire(black_box(oversized), Target::Gpu).unwrap();
            manager.release(bo);
        })
    });
}

fn bench_mixed_sizes(c: &mut Criterion) {
    let manager = cache();
    let sizes: Vec<u64> = (0..64u64).map(|i| 1 + (i * 7919 % 256) * 1024).collect();
    c.bench_function("mixed_sizes_hold_8", |b| {
        b.iter(|| {
            let mut held = Vec::with_capacity(8);
            for &size in &sizes {
                held.push(manager.acquire(size, Target::Gpu).unwrap());
                if held.len() == 8 {
                    for bo in held.drain(..) {
                        manager.release(bo);
                    }
                }
            }
            for bo in held {
                manager.release(bo);
            }
        })
    });
}

criterion_group!(benches, bench_hit_round_trip, bench_fresh_allocation, bench_mixed_sizes);
criterion_main!(benches);
