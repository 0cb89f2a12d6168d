//! Criterion benchmarks for sampling and neighbour search.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pct_core::{farthest_point_sample, gather_points, knn, three_nn_weights, Point3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Uniform random points in a 50m x 50m x 10m tile
fn make_tile(n: usize, seed: u64) -> Vec<Point3> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            Point3::new(
                rng.gen_range(0.0..50.0),
                rng.gen_range(0.0..50.0),
                rng.gen_range(0.0..10.0),
            )
        })
        .collect()
}

fn bench_fps(c: &mut Criterion) {
    let mut group = c.benchmark_group("farthest_point_sample");

    for size in [1024usize, 4096, 10000] {
        let points = make_tile(size, 7);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("quarter", size), &points, |b, points| {
            b.iter(|| black_box(farthest_point_sample(points, points.len() / 4)))
        });
    }

    group.finish();
}

fn bench_knn(c: &mut Criterion) {
    let mut group = c.benchmark_group("knn");

    for size in [1024usize, 4096] {
        let points = make_tile(size, 11);
        let centers = gather_points(&points, &farthest_point_sample(&points, size / 16).unwrap());
        group.throughput(Throughput::Elements(centers.len() as u64));
        group.bench_with_input(BenchmarkId::new("k32", size), &points, |b, points| {
            b.iter(|| black_box(knn(points, &centers, 32)))
        });
    }

    group.finish();
}

fn bench_three_nn(c: &mut Criterion) {
    let dense = make_tile(4096, 3);
    let sparse = make_tile(256, 5);

    c.bench_function("three_nn_4096_from_256", |b| {
        b.iter(|| black_box(three_nn_weights(&sparse, &dense)))
    });
}

criterion_group!(benches, bench_fps, bench_knn, bench_three_nn);
criterion_main!(benches);
