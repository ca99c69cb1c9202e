//! # Flake Benchmarks
//!
//! Capture and reconstruction cost per provider and compressor.
//!
//! Run with: `cargo bench -p flakes-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use flakes_core::harness::{build_samples, sample_types};
use flakes_core::{
    CompressionLevel, CompressionOptions, Compressor, Flakes, ObjectId, ObjectStore,
    ProviderRegistry, ReadOptions, World,
};
use std::hint::black_box;

/// A world holding the complex sample with `children` owned children.
fn complex_world(children: usize) -> (World, ObjectId) {
    let mut world = World::new(sample_types().expect("sample types"));
    let samples = build_samples(&mut world, children).expect("samples");
    (world, samples.complex)
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_make_flake(c: &mut Criterion) {
    let mut group = c.benchmark_group("make_flake");
    let (world, root) = complex_world(100);

    for provider in ProviderRegistry::with_builtin().names() {
        let flakes = Flakes::default().with_provider(&provider);
        group.bench_with_input(BenchmarkId::from_parameter(&provider), &root, |b, &root| {
            b.iter(|| black_box(flakes.make_object(&world, Some(root))));
        });
    }

    group.finish();
}

fn bench_create_object(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_object");

    for children in [10, 100, 1000].iter() {
        let (mut world, root) = complex_world(*children);
        let flakes = Flakes::default();
        let flake = flakes.make_object(&world, Some(root)).expect("flake");
        let class = world.class_of(root).expect("class");

        group.bench_with_input(BenchmarkId::from_parameter(children), &flake, |b, flake| {
            b.iter(|| {
                let copy = flakes
                    .create_object(&mut world, flake, &class, None)
                    .expect("copy");
                world.destroy_object(copy).expect("destroy");
            });
        });
    }

    group.finish();
}

fn bench_compressors(c: &mut Criterion) {
    let mut group = c.benchmark_group("compressors");
    let (world, root) = complex_world(200);

    for compressor in [Compressor::Deflate, Compressor::Zlib, Compressor::Lz4] {
        for level in [CompressionLevel::Fastest, CompressionLevel::Optimal] {
            let flakes = Flakes::default().with_read_options(ReadOptions {
                compression: CompressionOptions { compressor, level },
                ..ReadOptions::default()
            });
            let id = format!("{}/{:?}", compressor.name(), level);
            group.bench_with_input(BenchmarkId::from_parameter(id), &root, |b, &root| {
                b.iter(|| black_box(flakes.make_object(&world, Some(root))));
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_make_flake, bench_create_object, bench_compressors);
criterion_main!(benches);
