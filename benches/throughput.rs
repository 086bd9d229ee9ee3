use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rayon::prelude::*;
use std::hint::black_box;
use std::time::Duration;

use streamfork::{Pipeline, SchedulerHandle, collectors};

const SIZES: [u64; 3] = [10_000, 100_000, 1_000_000];

/// Map-filter-sum: streamfork sequential, streamfork parallel, rayon
fn bench_map_filter_sum(c: &mut Criterion) {
    let scheduler = SchedulerHandle::new(0);
    let mut group = c.benchmark_group("map_filter_sum");
    group.measurement_time(Duration::from_secs(5));

    for size in SIZES {
        group.bench_with_input(BenchmarkId::new("sequential", size), &size, |b, &size| {
            b.iter(|| {
                Pipeline::from_container(0..black_box(size))
                    .map(|x| x.wrapping_mul(31))
                    .filter(|x| x % 3 == 0)
                    .collect(collectors::summing::<u64>())
                    .unwrap()
            })
        });

        group.bench_with_input(BenchmarkId::new("parallel", size), &size, |b, &size| {
            b.iter(|| {
                Pipeline::from_container(0..black_box(size))
                    .parallel_on(&scheduler)
                    .map(|x| x.wrapping_mul(31))
                    .filter(|x| x % 3 == 0)
                    .collect(collectors::summing::<u64>())
                    .unwrap()
            })
        });

        group.bench_with_input(BenchmarkId::new("rayon", size), &size, |b, &size| {
            b.iter(|| {
                (0..black_box(size))
                    .into_par_iter()
                    .map(|x| x.wrapping_mul(31))
                    .filter(|x| x % 3 == 0)
                    .sum::<u64>()
            })
        });
    }

    group.finish();
}

/// Parallel stable sort of a materialized vector
fn bench_sorted(c: &mut Criterion) {
    let scheduler = SchedulerHandle::new(0);
    let items: Vec<u64> = (0..200_000u64).map(|i| i.wrapping_mul(2_654_435_761) % 10_007).collect();

    let mut group = c.benchmark_group("sorted");
    group.sample_size(20);

    group.bench_function("parallel", |b| {
        b.iter(|| {
            Pipeline::from_container(items.clone())
                .parallel_on(&scheduler)
                .sorted()
                .count()
                .unwrap()
        })
    });

    group.bench_function("rayon", |b| {
        b.iter(|| {
            let mut sorted = items.clone();
            sorted.par_sort();
            black_box(sorted.len())
        })
    });

    group.finish();
}

/// Grouping into a shared concurrent map against per-leaf hash maps
fn bench_grouping(c: &mut Criterion) {
    let scheduler = SchedulerHandle::new(0);
    let mut group = c.benchmark_group("grouping");
    group.sample_size(20);

    group.bench_function("grouping_by", |b| {
        b.iter(|| {
            Pipeline::from_container(0..500_000u64)
                .parallel_on(&scheduler)
                .collect(collectors::grouping_by(|x: &u64| x % 1_000, collectors::counting()))
                .unwrap()
        })
    });

    group.bench_function("grouping_by_concurrent", |b| {
        b.iter(|| {
            Pipeline::from_container(0..500_000u64)
                .parallel_on(&scheduler)
                .collect(collectors::grouping_by_concurrent(
                    |x: &u64| x % 1_000,
                    collectors::counting(),
                ))
                .unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_map_filter_sum, bench_sorted, bench_grouping);
criterion_main!(benches);
