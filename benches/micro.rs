//! Micro-benchmarks for dynamis core operations.
//!
//! Uses Criterion for statistically rigorous measurement with regression
//! detection and HTML reports.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench micro              # run all micro-benchmarks
//! cargo bench --bench micro -- insert    # filter by name
//! ```
//!
//! Reports are generated in `target/criterion/report/index.html`.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use dynamis::query::count::RangeCount;
use dynamis::query::lookup::{LookupParams, PointLookup};
use dynamis::query::range::{RangeParams, RangeQuery};
use dynamis::query::wss::{WeightedSetSample, WssParams};
use dynamis::shard::{AliasShard, SortedShard};
use dynamis::{
    DynamicExtension, ExtensionConfig, KeyValue, ReconstructionPolicy, WeightedPair,
};

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

type Rec = KeyValue<u64, u64>;
type Ext = DynamicExtension<Rec, SortedShard<Rec>>;
type WRec = WeightedPair<u64, u64>;
type WExt = DynamicExtension<WRec, AliasShard<WRec>>;

fn config(policy: ReconstructionPolicy) -> ExtensionConfig {
    ExtensionConfig {
        buffer_capacity: 12_000,
        scale_factor: 6,
        max_tombstone_proportion: 0.05,
        policy,
        parallel_queries: false,
    }
}

/// Builds an extension holding `n` sequential records.
fn populated(policy: ReconstructionPolicy, n: u64) -> Ext {
    let ext = DynamicExtension::new(config(policy)).expect("construct");
    for k in 0..n {
        ext.insert(KeyValue::new(k, k)).expect("insert");
    }
    ext
}

/// Builds a weighted extension with unit weights.
fn populated_weighted(n: u64) -> WExt {
    let ext = DynamicExtension::new(config(ReconstructionPolicy::Tiering)).expect("construct");
    for k in 0..n {
        ext.insert(WeightedPair::new(k, k, 1.0)).expect("insert");
    }
    ext
}

// ================================================================================================
// Write benchmarks
// ================================================================================================

/// Sustained insert throughput, reconstruction cost amortized in.
///
/// Small and large preloads expose how cascade depth affects the
/// steady-state write path under both disciplines.
fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    group.throughput(Throughput::Elements(1));

    for policy in [ReconstructionPolicy::Tiering, ReconstructionPolicy::Leveling] {
        group.bench_function(BenchmarkId::new("sustained", format!("{policy:?}")), |b| {
            let ext = populated(policy, 50_000);
            let mut seq = 50_000u64;

            b.iter(|| {
                ext.insert(black_box(KeyValue::new(seq, seq))).unwrap();
                seq += 1;
            });
        });
    }

    // Insert/erase mix at a 5% delete proportion.
    group.bench_function("mixed_with_erases", |b| {
        let ext = populated(ReconstructionPolicy::Tiering, 50_000);
        let mut seq = 50_000u64;

        b.iter(|| {
            ext.insert(KeyValue::new(seq, seq)).unwrap();
            if seq % 20 == 0 {
                ext.erase(KeyValue::new(seq - 10_000, seq - 10_000)).unwrap();
            }
            seq += 1;
        });
    });

    group.finish();
}

// ================================================================================================
// Query benchmarks
// ================================================================================================

/// Range query latency at several selectivities over a settled cascade.
fn bench_range_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_query");
    let ext = populated(ReconstructionPolicy::Tiering, 200_000);

    for width in [100u64, 1_000, 10_000] {
        group.bench_function(BenchmarkId::new("width", width), |b| {
            let mut lo = 0u64;
            b.iter(|| {
                let mut params = RangeParams::new(lo, lo + width);
                let hits = ext.query::<RangeQuery>(black_box(&mut params)).unwrap();
                lo = (lo + 7_919) % (200_000 - width);
                black_box(hits.len())
            });
        });
    }

    group.bench_function("count_10k", |b| {
        let mut lo = 0u64;
        b.iter(|| {
            let mut params = RangeParams::new(lo, lo + 10_000);
            let count = ext.query::<RangeCount>(black_box(&mut params)).unwrap();
            lo = (lo + 7_919) % 190_000;
            black_box(count)
        });
    });

    group.finish();
}

/// Point lookup latency: present and absent keys (bloom-filter path).
fn bench_point_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("point_lookup");
    group.throughput(Throughput::Elements(1));
    let ext = populated(ReconstructionPolicy::Tiering, 200_000);

    group.bench_function("hit", |b| {
        let mut key = 0u64;
        b.iter(|| {
            let mut params = LookupParams::new(key);
            let hit = ext.query::<PointLookup>(black_box(&mut params)).unwrap();
            key = (key + 7_919) % 200_000;
            black_box(hit)
        });
    });

    group.bench_function("miss", |b| {
        let mut key = 1_000_000u64;
        b.iter(|| {
            let mut params = LookupParams::new(key);
            let hit = ext.query::<PointLookup>(black_box(&mut params)).unwrap();
            key += 1;
            black_box(hit)
        });
    });

    group.finish();
}

/// Weighted sampling throughput for several sample sizes.
fn bench_sampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("sampling");
    let ext = populated_weighted(100_000);

    for k in [100usize, 1_000] {
        group.throughput(Throughput::Elements(k as u64));
        group.bench_function(BenchmarkId::new("wss", k), |b| {
            let mut seed = 0u64;
            b.iter(|| {
                let mut params = WssParams::seeded(k, seed);
                let samples = ext.query::<WeightedSetSample>(&mut params).unwrap();
                seed += 1;
                black_box(samples.len())
            });
        });
    }

    group.finish();
}

// ================================================================================================
// Group registration
// ================================================================================================

criterion_group!(
    benches,
    bench_insert,
    bench_range_query,
    bench_point_lookup,
    bench_sampling,
);

criterion_main!(benches);
