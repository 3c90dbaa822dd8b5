//! Criterion benchmarks for the TTL cache: put, get hit/miss, get_or_compute, cleanup.

use std::time::Duration;

use conflux_cache::TtlCache;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};

const HOUR: Duration = Duration::from_secs(3600);

fn populated(n: usize) -> TtlCache<String, u64> {
    let cache = TtlCache::new(HOUR);
    for i in 0..n {
        cache.put(format!("key:{i}"), i as u64);
    }
    cache
}

fn bench_put(c: &mut Criterion) {
    let cache: TtlCache<String, u64> = TtlCache::new(HOUR);
    let mut g = c.benchmark_group("put");
    g.throughput(Throughput::Elements(1));
    let mut i = 0u64;
    g.bench_function("put", |b| {
        b.iter(|| {
            i = i.wrapping_add(1);
            cache.put(format!("key:{}", i % 10_000), black_box(i));
        });
    });
    g.finish();
}

fn bench_get(c: &mut Criterion) {
    let cache = populated(10_000);
    let mut g = c.benchmark_group("get");
    g.throughput(Throughput::Elements(1));
    g.bench_function("hit", |b| {
        b.iter(|| black_box(cache.get("key:4242")));
    });
    g.bench_function("miss", |b| {
        b.iter(|| black_box(cache.get("absent")));
    });
    g.finish();
}

fn bench_get_or_compute(c: &mut Criterion) {
    let cache = populated(10_000);
    let mut g = c.benchmark_group("get_or_compute");
    g.throughput(Throughput::Elements(1));
    g.bench_function("cached", |b| {
        b.iter(|| black_box(cache.get_or_compute("key:17".to_string(), |_| 0)));
    });
    g.finish();
}

fn bench_cleanup(c: &mut Criterion) {
    let mut g = c.benchmark_group("cleanup");
    g.throughput(Throughput::Elements(10_000));
    g.bench_function("cleanup_10k_expired", |b| {
        b.iter_batched(
            || {
                let cache: TtlCache<String, u64> = TtlCache::new(Duration::ZERO);
                for i in 0..10_000u64 {
                    cache.put(format!("key:{i}"), i);
                }
                std::thread::sleep(Duration::from_millis(1));
                cache
            },
            |cache| black_box(cache.cleanup()),
            BatchSize::LargeInput,
        );
    });
    g.finish();
}

criterion_group!(benches, bench_put, bench_get, bench_get_or_compute, bench_cleanup);
criterion_main!(benches);
