// Copyright 2025 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Spatial index basics.
//!
//! Load a board, drag one stroke, teleport another, hit-test, and watch the churn classifier.
//!
//! Run:
//! - `RUST_LOG=trace cargo run -p vellum_demos --example index_basics`

use vellum_index::{Aabb2D, ObjectDesc, ObjectFlags, ObjectId, ObjectKind, SpatialIndex};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    // A 40 x 40 sheet of sticky notes with one image on top.
    let mut board: Vec<_> = (0..1600_u64)
        .map(|n| {
            let x = (n % 40) as f64 * 150.0;
            let y = (n / 40) as f64 * 150.0;
            ObjectDesc::new(n, ObjectKind::Shape, Aabb2D::from_xywh(x, y, 120.0, 120.0))
        })
        .collect();
    let mut image = ObjectDesc::new(
        9000,
        ObjectKind::Image,
        Aabb2D::from_xywh(40.0, 40.0, 400.0, 300.0),
    );
    image.draw_order = Some(10);
    board.push(image);

    let mut idx = SpatialIndex::new();
    let loaded = idx.bulk_load(&board);
    log::info!("loaded {loaded} objects: {:?}", idx.stats());

    // Drag note 0 in small steps; repeated moves classify it dynamic.
    for step in 1..=6 {
        let d = f64::from(step) * 3.0;
        idx.update_bounds(ObjectId(0), Aabb2D::from_xywh(d, d, 120.0, 120.0));
    }
    let view = idx.get(ObjectId(0)).expect("note 0 is indexed");
    log::info!("note 0 after drag: depth {} flags {:?}", view.depth, view.flags);
    assert!(view.flags.contains(ObjectFlags::DYNAMIC));

    // Teleport a note far off the board; the root grows to reach it.
    idx.update_bounds(ObjectId(7), Aabb2D::from_xywh(250_000.0, -80_000.0, 120.0, 120.0));
    log::info!("after teleport: {:?}", idx.stats());

    // Hit-test the overlap of note 0 and the image, topmost first.
    let mut hits = idx.query_point(100.0, 100.0);
    idx.sort_by_draw_order(&mut hits);
    let topmost: Vec<_> = hits.iter().rev().filter_map(|h| idx.resolve(*h)).collect();
    log::info!("hit stack at (100, 100), top first: {topmost:?}");
    assert_eq!(topmost.first(), Some(&ObjectId(9000)));

    // Hand the moved ids to whoever caches renders of them.
    let mut dirty = Vec::new();
    idx.drain_dirty(&mut dirty);
    log::info!("{} objects dirty since the last drain", dirty.len());

    idx.remove(ObjectId(9000));
    let region = idx.query_region(Aabb2D::from_xywh(0.0, 0.0, 300.0, 300.0));
    log::info!("{} objects in the top-left corner after removing the image", region.len());
}
