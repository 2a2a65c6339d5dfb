// Copyright 2025 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chunk cache frames.
//!
//! Drive a spatial index and a chunk cache through a zoom sequence and print what each frame
//! rebuilt. Surfaces are simple display lists of clipped rectangles.
//!
//! Run:
//! - `RUST_LOG=vellum_chunks=trace cargo run -p vellum_demos --example chunk_frames`

use std::collections::{BTreeMap, BTreeSet};

use kurbo::{Rect, Vec2};
use vellum_chunks::{
    ChunkCache, ChunkCoord, ChunkMode, Detail, DrawOutcome, SegmentDraw, SegmentRenderer, Viewport,
};
use vellum_index::{Aabb2D, ObjectDesc, ObjectId, ObjectKind, SpatialIndex};

/// One recorded draw: what, where in chunk space, and how detailed.
#[derive(Debug)]
struct Command {
    object: ObjectId,
    area: Rect,
    detail: Detail,
}

/// Renders from the board's own object table, so deleted objects report as missing.
struct Board {
    objects: BTreeMap<ObjectId, ObjectDesc>,
}

impl SegmentRenderer for Board {
    type Surface = Vec<Command>;

    fn begin(
        &mut self,
        _chunk: ChunkCoord,
        _bounds: Rect,
        _mode: ChunkMode,
        recycled: Option<Vec<Command>>,
    ) -> Vec<Command> {
        let mut list = recycled.unwrap_or_default();
        list.clear();
        list
    }

    fn draw(&mut self, list: &mut Vec<Command>, segment: &SegmentDraw) -> DrawOutcome {
        if !self.objects.contains_key(&segment.object) {
            return DrawOutcome::Missing;
        }
        let whole =
            Rect::from_origin_size(segment.offset.to_point(), segment.object_bounds.size());
        list.push(Command {
            object: segment.object,
            area: segment.clip.unwrap_or(whole),
            detail: segment.detail,
        });
        DrawOutcome::Drawn
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Strokes along a diagonal that crosses many chunks, plus one wide banner.
    let mut objects = BTreeMap::new();
    for n in 0..400_u64 {
        let t = n as f64 * 37.0;
        let b = Aabb2D::from_xywh(t, t * 0.6, 80.0, 40.0);
        objects.insert(ObjectId(n), ObjectDesc::new(n, ObjectKind::Stroke, b));
    }
    let banner = Aabb2D::from_xywh(-500.0, 2000.0, 6000.0, 300.0);
    objects.insert(ObjectId(1000), ObjectDesc::new(1000, ObjectKind::Text, banner));

    let mut index = SpatialIndex::new();
    let all: Vec<_> = objects.values().cloned().collect();
    index.bulk_load(&all);

    let mut cache: ChunkCache<Vec<Command>> = ChunkCache::new();
    let mut dirty = Vec::new();
    index.drain_dirty(&mut dirty);
    cache.sync_from_index(&index, &dirty);
    log::info!(
        "{} objects in {} chunks ({} segments)",
        cache.object_count(),
        cache.chunk_count(),
        cache.segment_count()
    );

    let mut board = Board { objects };
    let mut selector = cache.lod_selector();
    let mut frame = |label: &str,
                     scale: f64,
                     cache: &mut ChunkCache<Vec<Command>>,
                     board: &mut Board| {
        let band = selector.select(scale);
        let viewport = Viewport::new(scale, Vec2::new(100.0, 100.0), 1920.0, 1080.0, band);
        let stats = cache.update_visible(&viewport, viewport.world_rect(), board);
        let mut commands = 0;
        let mut full_detail = 0;
        let mut covered = 0.0;
        let mut distinct = BTreeSet::new();
        for command in cache.visible_chunks().filter_map(|c| c.surface).flatten() {
            commands += 1;
            full_detail += usize::from(command.detail == Detail::Full);
            covered += command.area.area();
            distinct.insert(command.object);
        }
        log::info!(
            "{label:>12}: scale {scale:<5} {band:?} {stats:?}, {commands} draws of {} objects \
             ({full_detail} at full detail, {covered:.0} square units)",
            distinct.len()
        );
    };

    frame("first", 1.0, &mut cache, &mut board);
    frame("steady", 1.0, &mut cache, &mut board);
    // Just under the near threshold: hysteresis keeps the near band.
    frame("hover", 0.48, &mut cache, &mut board);
    frame("zoom out", 0.3, &mut cache, &mut board);
    frame("zoom in", 1.0, &mut cache, &mut board);
    frame("overview", 0.02, &mut cache, &mut board);

    // Drag the banner down one chunk row; only the chunks it touched or touches rebuild.
    let moved = Aabb2D::from_xywh(-500.0, 3100.0, 6000.0, 300.0);
    index.update_bounds(ObjectId(1000), moved);
    index.drain_dirty(&mut dirty);
    cache.sync_from_index(&index, &dirty);
    frame("after drag", 0.02, &mut cache, &mut board);

    // Delete a stroke through the index; the drained removal takes it out of the cache.
    board.objects.remove(&ObjectId(5));
    index.remove(ObjectId(5));
    index.drain_dirty(&mut dirty);
    cache.sync_from_index(&index, &dirty);
    frame("after delete", 0.02, &mut cache, &mut board);
    log::info!("chunks holding stroke 5: {:?}", cache.chunks_of(ObjectId(5)));

    // Delete one from the board only; the next rebuild of its chunks drops it lazily.
    board.objects.remove(&ObjectId(6));
    cache.invalidate_all();
    frame("lazy drop", 0.02, &mut cache, &mut board);
    log::info!("chunks holding stroke 6: {:?}", cache.chunks_of(ObjectId(6)));

    let hits = index.query_region(Aabb2D::from_xywh(0.0, 0.0, 200.0, 200.0));
    log::info!("index hits near the origin: {}", hits.len());
}
