// Criterion benchmarks for diffusive-core
//
// Run benchmarks with:
//   cargo bench -p diffusive-core
//
// For detailed output with plots:
//   cargo bench -p diffusive-core -- --save-baseline main

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use diffusive_core::{
    DiffuserStrategy, EndpointSet, RandomStrategy, ResultsCache, WeightedEndpoint, WeightedRandomStrategy,
};

fn endpoints(count: usize) -> EndpointSet {
    EndpointSet::new(
        (0..count)
            .map(|i| WeightedEndpoint::new(format!("http://10.0.0.{}:8182", i), (i % 4) as f64 + 1.0))
            .collect(),
    )
    .unwrap()
}

fn bench_random_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_select");

    for count in [2, 10, 50].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let mut strategy = RandomStrategy::new(endpoints(count), 1);
            b.iter(|| black_box(&mut strategy).select_endpoints());
        });
    }

    group.finish();
}

fn bench_weighted_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("weighted_select");

    for count in [2, 10, 50].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let mut strategy = WeightedRandomStrategy::new(endpoints(count), 1);
            b.iter(|| black_box(&mut strategy).select_endpoints());
        });
    }

    group.bench_function("10_endpoints_3_candidates", |b| {
        let mut strategy = WeightedRandomStrategy::new(endpoints(10), 1).with_candidates(3);
        b.iter(|| black_box(&mut strategy).select_endpoints());
    });

    group.finish();
}

fn bench_results_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("results_cache");

    group.bench_function("num_running_100_entries", |b| {
        let cache = ResultsCache::new(100);
        for i in 0..100 {
            let (_completer, handle) = diffusive_core::handle::pending(format!("req-{}", i));
            cache.add(
                &format!("req-{}", i),
                diffusive_core::CacheEntry::new(handle, Default::default(), "Math:double(i64)"),
            );
        }
        b.iter(|| black_box(&cache).num_running());
    });

    group.finish();
}

criterion_group!(benches, bench_random_select, bench_weighted_select, bench_results_cache);
criterion_main!(benches);
