//! Benchmarks for query execution.
//!
//! Setup (region population, index creation, compilation) happens outside the
//! measured closures; only `Query::execute` is timed.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tessera_core::{ObjectValue, Value};
use tessera_query::{QueryConfig, QueryService};
use tessera_storage::RegionCache;

/// Simple LCG for reproducible pseudo-random scores
fn scores(count: usize, seed: u64) -> Vec<i32> {
    let mut s = seed;
    (0..count)
        .map(|_| {
            s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((s >> 33) % 1000) as i32
        })
        .collect()
}

fn populate(cache: &RegionCache, count: usize, buckets: Option<usize>) {
    let put = |id: usize, score: i32| {
        ObjectValue::new("Trade")
            .with("ID", id as i32)
            .with("score", score)
            .with("status", if id % 4 == 0 { "open" } else { "closed" })
    };
    match buckets {
        Some(n) => {
            let region = cache.create_partitioned_region("trades", n, None).unwrap();
            for (id, score) in scores(count, 12345).into_iter().enumerate() {
                region.put(id as i32, put(id, score)).unwrap();
            }
        }
        None => {
            let region = cache.create_region("trades").unwrap();
            for (id, score) in scores(count, 12345).into_iter().enumerate() {
                region.put(id as i32, put(id, score)).unwrap();
            }
        }
    }
}

fn service(count: usize, indexed: bool) -> QueryService {
    let cache = Arc::new(RegionCache::new());
    populate(&cache, count, None);
    let service = QueryService::new(cache);
    if indexed {
        service.create_index("scoreIdx", "t.score", "/trades t").unwrap();
    }
    service
}

fn bench_range_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_filter");
    for &count in &[1_000usize, 10_000] {
        for indexed in [false, true] {
            let service = service(count, indexed);
            let query = service
                .new_query("SELECT t.ID FROM /trades t WHERE t.score >= $1 AND t.score < $2")
                .unwrap();
            let params = [Value::Int(100), Value::Int(150)];
            let label = if indexed { "index" } else { "scan" };
            group.bench_with_input(BenchmarkId::new(label, count), &count, |b, _| {
                b.iter(|| black_box(query.execute(&params).unwrap()))
            });
        }
    }
    group.finish();
}

fn bench_order_by_limit(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_by_limit");
    for indexed in [false, true] {
        let service = service(10_000, indexed);
        let query = service
            .new_query("SELECT t.ID, t.score FROM /trades t WHERE t.score > 10 ORDER BY t.score DESC LIMIT 10")
            .unwrap();
        let label = if indexed { "index" } else { "sort" };
        group.bench_function(label, |b| b.iter(|| black_box(query.execute(&[]).unwrap())));
    }
    group.finish();
}

fn bench_distinct(c: &mut Criterion) {
    let service = service(10_000, false);
    let query = service
        .new_query("SELECT DISTINCT t.status, t.score FROM /trades t")
        .unwrap();
    c.bench_function("distinct_struct", |b| {
        b.iter(|| black_box(query.execute(&[]).unwrap()))
    });
}

fn bench_partitioned(c: &mut Criterion) {
    let mut group = c.benchmark_group("partitioned");
    let cache = Arc::new(RegionCache::new());
    populate(&cache, 20_000, Some(16));
    for parallel in [false, true] {
        let service = QueryService::new(Arc::clone(&cache))
            .with_config(QueryConfig::default().with_parallel_buckets(parallel));
        let query = service
            .new_query("SELECT t.ID FROM /trades t WHERE t.status = 'open' ORDER BY t.ID LIMIT 100")
            .unwrap();
        let label = if parallel { "parallel" } else { "sequential" };
        group.bench_function(label, |b| b.iter(|| black_box(query.execute(&[]).unwrap())));
    }
    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let service = service(10, false);
    c.bench_function("compile", |b| {
        b.iter(|| {
            black_box(
                service
                    .new_query(
                        "SELECT DISTINCT p.ID, p.status FROM /trades p \
                         WHERE p.score > 5 AND (p.status = 'open' OR p.ID IN SET(1, 2, 3)) \
                         ORDER BY p.status, p.ID DESC LIMIT 20",
                    )
                    .unwrap(),
            )
        })
    });
}

criterion_group!(
    benches,
    bench_range_filter,
    bench_order_by_limit,
    bench_distinct,
    bench_partitioned,
    bench_compile
);
criterion_main!(benches);
