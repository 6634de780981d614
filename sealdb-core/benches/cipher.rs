//! Benchmarks for payload sealing.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use sealdb_core::cipher::{open_coordinates, seal_coordinates};
use sealdb_core::Key;

fn generate_random_vector(dim: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn bench_seal(c: &mut Criterion) {
    let mut group = c.benchmark_group("seal_coordinates");
    let key = Key::generate();

    for dim in [3, 128, 384, 1536].iter() {
        let v = generate_random_vector(*dim);

        group.throughput(Throughput::Bytes((*dim * 4) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |bench, _| {
            bench.iter(|| seal_coordinates(black_box(&v), &key).unwrap())
        });
    }

    group.finish();
}

fn bench_open(c: &mut Criterion) {
    let mut group = c.benchmark_group("open_coordinates");
    let key = Key::generate();

    for dim in [3, 128, 384, 1536].iter() {
        let sealed = seal_coordinates(&generate_random_vector(*dim), &key).unwrap();

        group.throughput(Throughput::Bytes((*dim * 4) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |bench, _| {
            bench.iter(|| open_coordinates(black_box(&sealed), &key).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_seal, bench_open);
criterion_main!(benches);
