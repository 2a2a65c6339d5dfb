// Copyright 2025 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use vellum_index::{Aabb2D, ObjectDesc, ObjectId, ObjectKind, SpatialIndex};

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
    fn next_f64(&mut self) -> f64 {
        let v = self.next_u64() >> 11;
        (v as f64) / ((1u64 << 53) as f64)
    }
}

/// Strokes scattered over a `world` x `world` board.
fn gen_strokes(count: usize, world: f64, seed: u64) -> Vec<Aabb2D> {
    let mut rng = Rng::new(seed);
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let w = 4.0 + rng.next_f64() * 60.0;
        let h = 4.0 + rng.next_f64() * 60.0;
        let x = rng.next_f64() * world;
        let y = rng.next_f64() * world;
        out.push(Aabb2D::from_xywh(x, y, w, h));
    }
    out
}

/// Dense clusters, like handwriting on a few regions of the board.
fn gen_clustered(n_clusters: usize, per_cluster: usize, spread: f64) -> Vec<Aabb2D> {
    let mut rng = Rng::new(0xC1A5_7E55_9999_ABCD);
    let mut out = Vec::with_capacity(n_clusters * per_cluster);
    for _ in 0..n_clusters {
        let (cx, cy) = (rng.next_f64() * 50_000.0, rng.next_f64() * 50_000.0);
        for _ in 0..per_cluster {
            let dx = (rng.next_f64() - 0.5) * spread;
            let dy = (rng.next_f64() - 0.5) * spread;
            out.push(Aabb2D::from_xywh(cx + dx, cy + dy, 12.0, 12.0));
        }
    }
    out
}

fn filled(boxes: &[Aabb2D]) -> SpatialIndex {
    let mut idx = SpatialIndex::new();
    for (i, b) in boxes.iter().enumerate() {
        idx.insert(ObjectId(i as u64), *b);
    }
    idx
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    for &n in &[1_000usize, 10_000, 100_000] {
        let boxes = gen_strokes(n, 100_000.0, 0xCAFE_F00D_DEAD_BEEF);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("scattered_n{n}"), |b| {
            b.iter_batched(
                SpatialIndex::new,
                |mut idx| {
                    for (i, r) in boxes.iter().enumerate() {
                        idx.insert(ObjectId(i as u64), *r);
                    }
                    black_box(idx.len());
                },
                BatchSize::LargeInput,
            );
        });
    }
    let clustered = gen_clustered(20, 2_000, 400.0);
    group.throughput(Throughput::Elements(clustered.len() as u64));
    group.bench_function("clustered_40k", |b| {
        b.iter_batched(
            SpatialIndex::new,
            |mut idx| {
                for (i, r) in clustered.iter().enumerate() {
                    idx.insert(ObjectId(i as u64), *r);
                }
                black_box(idx.stats().nodes);
            },
            BatchSize::LargeInput,
        );
    });
    let descs: Vec<_> = gen_strokes(100_000, 100_000.0, 0xFACE_FEED_CAFE_BABE)
        .into_iter()
        .enumerate()
        .map(|(i, b)| ObjectDesc::new(i as u64, ObjectKind::Stroke, b))
        .collect();
    group.throughput(Throughput::Elements(descs.len() as u64));
    group.bench_function("bulk_load_100k", |b| {
        let mut idx = SpatialIndex::new();
        b.iter(|| black_box(idx.bulk_load(&descs)));
    });
    group.finish();
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("update");
    let boxes = gen_strokes(50_000, 100_000.0, 0x1234_5678_9ABC_DEF0);
    let mut idx = filled(&boxes);
    let mut rng = Rng::new(0xBADC_F00D_1234_5678);
    group.throughput(Throughput::Elements(1_000));
    group.bench_function("drag_small_moves", |b| {
        b.iter(|| {
            for _ in 0..1_000 {
                let i = (rng.next_u64() % boxes.len() as u64) as usize;
                let r = boxes[i];
                let dx = (rng.next_f64() - 0.5) * 4.0;
                let dy = (rng.next_f64() - 0.5) * 4.0;
                idx.update_bounds(
                    ObjectId(i as u64),
                    Aabb2D::new(r.min_x + dx, r.min_y + dy, r.max_x + dx, r.max_y + dy),
                );
            }
        });
    });
    group.bench_function("teleport", |b| {
        b.iter(|| {
            for _ in 0..1_000 {
                let i = (rng.next_u64() % boxes.len() as u64) as usize;
                let x = rng.next_f64() * 100_000.0;
                let y = rng.next_f64() * 100_000.0;
                idx.update_bounds(ObjectId(i as u64), Aabb2D::from_xywh(x, y, 20.0, 20.0));
            }
        });
    });
    group.bench_function("remove_reinsert", |b| {
        b.iter(|| {
            for _ in 0..1_000 {
                let i = (rng.next_u64() % boxes.len() as u64) as usize;
                idx.remove(ObjectId(i as u64));
                idx.insert(ObjectId(i as u64), boxes[i]);
            }
        });
    });
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");
    let boxes = gen_strokes(100_000, 100_000.0, 0xDEAD_BEEF_0BAD_F00D);
    let mut idx = filled(&boxes);
    let mut out = Vec::new();
    for &(name, side) in &[("viewport_2k", 2_000.0), ("overview_40k", 40_000.0)] {
        group.bench_function(name, |b| {
            b.iter(|| {
                idx.query_region_into(Aabb2D::from_xywh(30_000.0, 30_000.0, side, side), &mut out);
                black_box(out.len());
            });
        });
    }
    let mut rng = Rng::new(0x0F0F_F0F0_1357_9BDF);
    group.bench_function("hit_test_point", |b| {
        b.iter(|| {
            let x = rng.next_f64() * 100_000.0;
            let y = rng.next_f64() * 100_000.0;
            idx.query_point_into(x, y, &mut out);
            black_box(out.len());
        });
    });
    group.finish();
}

criterion_group!(benches, bench_insert, bench_update, bench_query);
criterion_main!(benches);
