// Copyright 2025 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Basic usage of Vellum Index: insert, move, query, and inspect.

use vellum_index::{Aabb2D, ObjectId, SpatialIndex};

fn main() {
    let mut idx = SpatialIndex::new();
    for n in 0..100_u64 {
        let x = (n % 10) as f64 * 120.0;
        let y = (n / 10) as f64 * 120.0;
        idx.insert(ObjectId(n), Aabb2D::from_xywh(x, y, 100.0, 100.0));
    }

    // Move one object far off the current root.
    idx.update_bounds(ObjectId(42), Aabb2D::from_xywh(90_000.0, -40_000.0, 100.0, 100.0));

    let hits = idx.query_region(Aabb2D::from_xywh(0.0, 0.0, 250.0, 250.0));
    println!("hits in top-left corner: {}", hits.len());
    println!("stats: {:?}", idx.stats());
}
