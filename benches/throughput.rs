//! Throughput benchmarks for the sequence pipeline.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rill::sequence::{Sequence, Step};
use std::hint::black_box;

fn chain(len: u64) -> Sequence<u64> {
    Sequence::iterate(0u64, |n| n + 1)
        .map(|n| n * 3)
        .filter(|n| n % 2 == 0)
        .limit(len as usize)
}

fn bench_push_traversal(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_traversal");

    for len in [1_000u64, 100_000] {
        group.throughput(Throughput::Elements(len));
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            b.iter(|| {
                let mut sum = 0u64;
                chain(len).traverse(|n| {
                    sum += n;
                    Step::Continue
                });
                black_box(sum)
            });
        });
    }

    group.finish();
}

fn bench_pull_traversal(c: &mut Criterion) {
    let mut group = c.benchmark_group("pull_traversal");

    for len in [1_000u64, 100_000] {
        group.throughput(Throughput::Elements(len));
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            b.iter(|| {
                let mut sum = 0u64;
                let mut seq = chain(len);
                while seq.has_next() {
                    sum += seq.next();
                }
                black_box(sum)
            });
        });
    }

    group.finish();
}

fn bench_terminal_short_circuit(c: &mut Criterion) {
    c.bench_function("any_over_infinite_source", |b| {
        b.iter(|| {
            let hit = Sequence::iterate(0u64, |n| n + 1).any(|n| *n == black_box(10_000));
            black_box(hit)
        });
    });
}

criterion_group!(
    benches,
    bench_push_traversal,
    bench_pull_traversal,
    bench_terminal_short_circuit
);
criterion_main!(benches);
