//! Benchmarks for the hot matchmaking paths
//!
//! Rating bucketing runs once per waiting entry per tick; pairing runs once
//! per room per round.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use arena_lobby::game::pair_seats;
use arena_lobby::utils::rating_bucket;

fn bench_rating_bucket(c: &mut Criterion) {
    c.bench_function("rating_bucket", |b| {
        b.iter(|| {
            for i in 0..1000 {
                black_box(rating_bucket(black_box(800.0 + i as f64), 200.0));
            }
        })
    });
}

fn bench_pair_seats(c: &mut Criterion) {
    let mut group = c.benchmark_group("pair_seats");
    for size in [2usize, 7, 8] {
        let seats: Vec<String> = (0..size).map(|i| format!("seat_{}", i)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &seats, |b, seats| {
            b.iter(|| black_box(pair_seats(black_box(seats))))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_rating_bucket, bench_pair_seats);
criterion_main!(benches);
