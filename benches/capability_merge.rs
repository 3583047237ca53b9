//! Benchmark for the capability merge
//!
//! Steady-state sweeps mostly see unchanged capabilities and moving free
//! capacity; the merge must stay cheap for backends with many pools.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use storage_backend_manager::controlplane::merge_capabilities;
use storage_backend_manager::{CapabilityMap, Pool, PoolCapabilities, StorageKind};

fn backend_caps() -> CapabilityMap {
    CapabilityMap::from([
        ("SupportThin".to_string(), json!(true)),
        ("SupportThick".to_string(), json!(false)),
        ("SupportQoS".to_string(), json!(true)),
        ("SupportClone".to_string(), json!(true)),
    ])
}

fn pool_caps(pools: usize, tick: u64) -> PoolCapabilities {
    (0..pools)
        .map(|i| {
            (
                format!("pool-{:04}", i),
                CapabilityMap::from([
                    ("FreeCapacity".to_string(), json!(1_000_000 + tick)),
                    ("TotalCapacity".to_string(), json!(2_000_000u64)),
                    ("UsedCapacity".to_string(), json!(1_000_000 - tick)),
                ]),
            )
        })
        .collect()
}

fn pools(count: usize) -> Vec<Pool> {
    (0..count)
        .map(|i| Pool::new(format!("pool-{:04}", i), "bench"))
        .collect()
}

fn bench_unchanged(c: &mut Criterion) {
    let mut group = c.benchmark_group("capability_merge");

    for count in [8usize, 128, 1024] {
        let backend = backend_caps();
        let reported = pool_caps(count, 0);
        let mut registry_pools = pools(count);
        merge_capabilities(StorageKind::FusionstorageSan, &mut registry_pools, &backend, &reported);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("unchanged", count), &count, |b, _| {
            b.iter(|| {
                merge_capabilities(
                    StorageKind::FusionstorageSan,
                    black_box(&mut registry_pools),
                    &backend,
                    &reported,
                )
            });
        });
    }

    group.finish();
}

fn bench_capacity_ticks(c: &mut Criterion) {
    let mut group = c.benchmark_group("capability_merge");
    let count = 128;
    let backend = backend_caps();
    let ticks: Vec<PoolCapabilities> = (0..16).map(|tick| pool_caps(count, tick)).collect();
    let mut registry_pools = pools(count);

    group.throughput(Throughput::Elements(count as u64));
    group.bench_function("capacity_ticks", |b| {
        let mut tick = 0usize;
        b.iter(|| {
            tick = (tick + 1) % ticks.len();
            merge_capabilities(
                StorageKind::FusionstorageSan,
                black_box(&mut registry_pools),
                &backend,
                &ticks[tick],
            )
        });
    });

    group.finish();
}

criterion_group!(benches, bench_unchanged, bench_capacity_ticks);
criterion_main!(benches);
