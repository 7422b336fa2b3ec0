//! # Range Query Benchmark
//!
//! A view pass queries a 7x7 chunk square per player. With 100 players on
//! a 20 tick/s server at a 10 tick interval that is 200 queries per second,
//! so a single query must stay well under a millisecond.
//!
//! Run with: `cargo bench --package cavecloak_index`

#![allow(missing_docs)]

use cavecloak_index::{BlockAppearance, BlockKey, SpatialBlockIndex, WorldName};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Fills a 32x32 chunk area with `per_chunk` tracked blocks each.
fn populated_index(per_chunk: i32) -> (SpatialBlockIndex, WorldName) {
    let index = SpatialBlockIndex::in_memory();
    let world = WorldName::new("world");
    let stone = BlockAppearance::from_material("stone");
    let ore = BlockAppearance::from_material("diamond_ore");
    for cx in -16..16 {
        for cz in -16..16 {
            for i in 0..per_chunk {
                let key = BlockKey::at(&world, cx * 16 + (i & 15), i / 16 - 32, cz * 16 + (i * 7 & 15));
                index.track(&key, if i % 5 == 0 { &ore } else { &stone });
            }
        }
    }
    (index, world)
}

fn bench_range_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_query_radius_3");

    for per_chunk in [16, 128, 512] {
        let (index, world) = populated_index(per_chunk);
        let mut buffer = Vec::new();
        group.bench_with_input(BenchmarkId::from_parameter(per_chunk), &per_chunk, |b, _| {
            b.iter(|| {
                buffer.clear();
                index.collect_range(&world, 0, 0, 3, &mut buffer);
                black_box(buffer.len())
            });
        });
    }

    group.finish();
}

fn bench_track_untrack(c: &mut Criterion) {
    let (index, world) = populated_index(64);
    let stone = BlockAppearance::from_material("stone");

    c.bench_function("track_untrack_cycle", |b| {
        let mut i = 0;
        b.iter(|| {
            let key = BlockKey::at(&world, i & 255, 100, i >> 8 & 255);
            index.track(&key, &stone);
            index.untrack(&key);
            i += 1;
        });
    });
}

criterion_group!(benches, bench_range_query, bench_track_untrack);
criterion_main!(benches);
