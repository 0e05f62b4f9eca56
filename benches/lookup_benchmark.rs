//! Lookup benchmarks.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use geobisect::{CachedCountryDb, CachedReaderConfig, CountryCode, CountryDb, Encoder, Record};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const COUNTRIES: [&str; 8] = ["US", "CN", "DE", "FR", "JP", "BR", "IN", "AU"];

/// Evenly spaced IPv4 and IPv6 tables with `count` records each.
fn generate_tables(count: usize) -> (Vec<u8>, Vec<u8>) {
    let mut v4 = Vec::with_capacity(count * 6);
    let mut v6 = Vec::with_capacity(count * 18);

    let v4_step = u32::MAX / count as u32;
    let v6_step = u128::MAX / count as u128;
    for i in 0..count {
        let country = CountryCode::parse(COUNTRIES[i % COUNTRIES.len()]).unwrap();
        let start = IpAddr::V4(Ipv4Addr::from(v4_step * i as u32));
        Record::new(start, country).write_to(&mut v4).unwrap();
        let start = IpAddr::V6(Ipv6Addr::from(v6_step * i as u128));
        Record::new(start, country).write_to(&mut v6).unwrap();
    }

    (v4, v6)
}

/// Pseudo-random addresses, half of each family.
fn generate_queries(count: usize) -> Vec<IpAddr> {
    let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
    (0..count)
        .map(|i| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            if i % 2 == 0 {
                IpAddr::V4(Ipv4Addr::from((state >> 32) as u32))
            } else {
                IpAddr::V6(Ipv6Addr::from(((state as u128) << 64) | state as u128))
            }
        })
        .collect()
}

fn bench_lookup(c: &mut Criterion) {
    let (v4, v6) = generate_tables(500_000);
    let db = CountryDb::from_bytes(v4, v6).unwrap();
    let queries = generate_queries(1000);

    let mut group = c.benchmark_group("lookup");
    group.throughput(Throughput::Elements(queries.len() as u64));

    group.bench_function("bisect_500k", |b| {
        b.iter(|| {
            for addr in &queries {
                black_box(db.lookup(*addr));
            }
        })
    });

    group.finish();
}

/// Benchmark scalability with different table sizes.
fn bench_scalability(c: &mut Criterion) {
    let mut group = c.benchmark_group("scalability");
    let queries = generate_queries(100);

    for size in [1_000, 10_000, 100_000, 1_000_000].iter() {
        let (v4, v6) = generate_tables(*size);
        let db = CountryDb::from_bytes(v4, v6).unwrap();

        group.throughput(Throughput::Elements(queries.len() as u64));
        group.bench_with_input(BenchmarkId::new("records", size), size, |b, _| {
            b.iter(|| {
                for addr in &queries {
                    black_box(db.lookup(*addr));
                }
            })
        });
    }

    group.finish();
}

/// Benchmark cache miss vs hit performance.
fn bench_cache_performance(c: &mut Criterion) {
    let (v4, v6) = generate_tables(500_000);
    let db = CachedCountryDb::with_config(
        CountryDb::from_bytes(v4, v6).unwrap(),
        CachedReaderConfig::with_capacity(10_000),
    );
    let addr: IpAddr = "93.184.216.34".parse().unwrap();

    let mut group = c.benchmark_group("cache_performance");

    group.bench_function("single_query_miss", |b| {
        b.iter_batched(
            || db.clear_cache(),
            |_| black_box(db.lookup(addr)),
            criterion::BatchSize::SmallInput,
        )
    });

    let _ = db.lookup(addr);
    group.bench_function("single_query_hit", |b| {
        b.iter(|| black_box(db.lookup(addr)))
    });

    group.finish();
}

/// Benchmark encoding a synthetic feed.
fn bench_encode(c: &mut Criterion) {
    let mut feed = String::new();
    for i in 0..10_000u32 {
        let start = Ipv4Addr::from(i << 16);
        let end = Ipv4Addr::from((i << 16) | 0xffff);
        feed.push_str(&format!(
            "{},{},{}\n",
            start,
            end,
            COUNTRIES[i as usize % COUNTRIES.len()]
        ));
    }

    let encoder = Encoder::new();
    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(10_000));

    group.bench_function("csv_10k_rows", |b| {
        b.iter(|| {
            let mut v4 = Vec::new();
            let mut v6 = Vec::new();
            black_box(encoder.encode(feed.as_bytes(), &mut v4, &mut v6).unwrap())
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_lookup,
    bench_scalability,
    bench_cache_performance,
    bench_encode,
);

criterion_main!(benches);
