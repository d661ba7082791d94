//! Criterion benchmarks for graph construction, agglomeration and relearning.

use std::hint::black_box;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use proofreader::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A `side` x `side` grid of 2x2 fragments with a noisy boundary image.
fn generate_volume(side: usize) -> (LabelVolume, ImageVolume) {
    let width = side * 2;
    let mut rng = StdRng::seed_from_u64(42);
    let mut labels = Vec::with_capacity(width * width);
    let mut image = Vec::with_capacity(width * width);
    for y in 0..width {
        for x in 0..width {
            labels.push(((y / 2) * side + x / 2 + 1) as u64);
            image.push(rng.random_range(0.0..1.0));
        }
    }
    (
        LabelVolume::new(vec![width, width], labels).unwrap(),
        ImageVolume::new(vec![width, width], image).unwrap(),
    )
}

fn bench_graph(c: &mut Criterion) {
    let (labels, image) = generate_volume(32);
    let mut group = c.benchmark_group("graph");
    group.throughput(Throughput::Elements(labels.len() as u64));

    group.bench_function("build", |b| {
        b.iter(|| Rag::new(black_box(&labels), black_box(&image), 0).unwrap())
    });

    let rag = Rag::new(&labels, &image, 0).unwrap();
    group.bench_function("agglomerate", |b| {
        b.iter(|| {
            let mut rag = rag.clone();
            rag.agglomerate(black_box(0.5)).unwrap()
        })
    });
    group.finish();
}

fn bench_relearn(c: &mut Criterion) {
    let (labels, image) = generate_volume(16);
    let mut config = SessionConfig::default();
    config.forest.n_trees = 20;
    let mut session = ProofreadingSession::new(&labels, &image, config).unwrap();
    for row in 0..8u64 {
        let start = row * 16 + 1;
        session.handle_merge(&[start, start + 1, start + 2]).unwrap();
        session.handle_separate(start + 2, start + 3).unwrap();
    }

    c.bench_function("relearn", |b| b.iter(|| session.relearn().unwrap()));
}

criterion_group!(benches, bench_graph, bench_relearn);
criterion_main!(benches);
