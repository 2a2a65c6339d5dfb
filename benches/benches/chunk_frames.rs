// Copyright 2025 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use kurbo::{Rect, Vec2};
use vellum_chunks::{
    ChunkCache, ChunkCoord, ChunkMode, DrawOutcome, LodBand, SegmentDraw, SegmentRenderer,
    Viewport,
};
use vellum_index::{Aabb2D, ObjectDesc, ObjectKind};

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

/// Counts draws into a reusable list; stands in for a real display list.
struct Counting;

impl SegmentRenderer for Counting {
    type Surface = Vec<SegmentDraw>;

    fn begin(
        &mut self,
        _chunk: ChunkCoord,
        _bounds: Rect,
        _mode: ChunkMode,
        recycled: Option<Self::Surface>,
    ) -> Self::Surface {
        let mut list = recycled.unwrap_or_default();
        list.clear();
        list
    }

    fn draw(&mut self, list: &mut Self::Surface, segment: &SegmentDraw) -> DrawOutcome {
        list.push(*segment);
        DrawOutcome::Drawn
    }
}

fn gen_board(count: usize, world: f64) -> Vec<ObjectDesc> {
    let mut rng = Rng::new(0xCAFE_F00D_DEAD_BEEF);
    (0..count)
        .map(|i| {
            let w = 4.0 + rng.next_f64() * 200.0;
            let h = 4.0 + rng.next_f64() * 200.0;
            let b = Aabb2D::from_xywh(rng.next_f64() * world, rng.next_f64() * world, w, h);
            ObjectDesc::new(i as u64, ObjectKind::Stroke, b)
        })
        .collect()
}

fn viewport(scale: f64, pan: Vec2, band: LodBand) -> Viewport {
    Viewport::new(scale, pan, 1920.0, 1080.0, band)
}

fn bench_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_sync");
    let board = gen_board(100_000, 100_000.0);
    group.throughput(Throughput::Elements(board.len() as u64));
    group.bench_function("initial_100k", |b| {
        b.iter_batched(
            ChunkCache::<Vec<SegmentDraw>>::new,
            |mut cache| black_box(cache.sync_objects(&board)),
            BatchSize::LargeInput,
        );
    });
    let mut cache = ChunkCache::<Vec<SegmentDraw>>::new();
    cache.sync_objects(&board);
    group.bench_function("resync_unchanged_100k", |b| {
        b.iter(|| black_box(cache.sync_objects(&board)));
    });
    group.finish();
}

fn bench_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_frames");
    let board = gen_board(100_000, 100_000.0);
    let mut cache = ChunkCache::<Vec<SegmentDraw>>::new();
    cache.sync_objects(&board);

    let near = viewport(1.0, Vec2::new(-40_000.0, -40_000.0), LodBand::Near);
    let mid = viewport(0.3, Vec2::new(-12_000.0, -12_000.0), LodBand::Mid);
    cache.update_visible(&near, near.world_rect(), &mut Counting);
    cache.update_visible(&mid, mid.world_rect(), &mut Counting);

    group.bench_function("steady_near", |b| {
        b.iter(|| black_box(cache.update_visible(&near, near.world_rect(), &mut Counting)));
    });
    group.bench_function("band_flap", |b| {
        b.iter(|| {
            let zoomed_in = cache.update_visible(&near, near.world_rect(), &mut Counting);
            let zoomed_out = cache.update_visible(&mid, mid.world_rect(), &mut Counting);
            black_box((zoomed_in, zoomed_out))
        });
    });
    let overview = viewport(0.01, Vec2::ZERO, LodBand::Overview);
    group.bench_function("overview_cold", |b| {
        b.iter(|| {
            cache.invalidate_all();
            black_box(cache.update_visible(&overview, overview.world_rect(), &mut Counting))
        });
    });
    let mut pan = near.pan;
    group.bench_function("pan_near", |b| {
        b.iter(|| {
            pan.x -= 97.0;
            let vp = viewport(1.0, pan, LodBand::Near);
            black_box(cache.update_visible(&vp, vp.world_rect(), &mut Counting))
        });
    });
    group.finish();
}

criterion_group!(benches, bench_sync, bench_frames);
criterion_main!(benches);
