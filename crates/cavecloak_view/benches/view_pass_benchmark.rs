//! # View Pass Benchmark
//!
//! The driver thread decides every tracked block near every player. A pass
//! over 1024 blocks must leave most of a 50 ms server tick to the host.
//!
//! Run with: `cargo bench --package cavecloak_view`

#![allow(missing_docs)]

use cavecloak_index::{BlockAppearance, BlockPos};
use cavecloak_view::host::{MockWorld, PlayerId};
use cavecloak_view::{MaskPaletteResolver, PlayerViewSession, ViewConfig, VisibilityEvaluator};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cgmath::{InnerSpace, MetricSpace, Point3, Vector3};

/// A long tunnel along +x with tracked candidates scattered in its walls.
fn tunnel_world() -> (MockWorld, Vec<BlockPos>) {
    let world = MockWorld::new("world").with_surface(100);
    world.fill_box(BlockPos::new(0, 40, -1), BlockPos::new(64, 42, 1), &BlockAppearance::air());
    let mut candidates = Vec::new();
    for i in 0..1024 {
        let x = (i * 7) % 64;
        let y = 38 + (i % 7);
        let z = if i % 2 == 0 { 2 + (i % 3) } else { -2 - (i % 3) };
        candidates.push(BlockPos::new(x, y, z));
    }
    (world, candidates)
}

fn bench_decide(c: &mut Criterion) {
    let (world, candidates) = tunnel_world();
    let config = ViewConfig::default();
    let evaluator = VisibilityEvaluator::from_config(&config);
    let eye = Point3::new(0.5, 41.62, 0.5);
    let direction = Vector3::new(1.0, -0.1, 0.0).normalize();
    let distances: Vec<f64> = candidates
        .iter()
        .map(|pos| Point3::from(pos.center()).distance2(eye))
        .collect();

    let mut group = c.benchmark_group("view_pass_decide");
    for count in [128usize, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let mut masked = 0usize;
                for (pos, distance_squared) in candidates.iter().zip(&distances).take(count) {
                    let verdict = evaluator.decide(&world, eye, direction, *pos, *distance_squared, false, false);
                    if verdict == cavecloak_view::visibility::Verdict::Mask {
                        masked += 1;
                    }
                }
                black_box(masked)
            });
        });
    }
    group.finish();
}

fn bench_resolve_mask(c: &mut Criterion) {
    let (world, candidates) = tunnel_world();
    let config = ViewConfig::default();

    c.bench_function("resolve_from_neighbors_1024", |b| {
        b.iter(|| {
            for pos in &candidates {
                black_box(MaskPaletteResolver::resolve_from_neighbors(&world, *pos, &config));
            }
        });
    });
}

fn bench_session_lookup(c: &mut Criterion) {
    let session = PlayerViewSession::new(PlayerId(1));
    let (_, candidates) = tunnel_world();
    let world = cavecloak_index::WorldName::new("world");
    let keys: Vec<_> = candidates
        .iter()
        .map(|pos| cavecloak_index::BlockKey::new(world.clone(), *pos))
        .collect();

    c.bench_function("session_display_state_1024", |b| {
        b.iter(|| keys.iter().filter(|key| session.is_revealed(key)).count());
    });
}

criterion_group!(benches, bench_decide, bench_resolve_mask, bench_session_lookup);
criterion_main!(benches);
