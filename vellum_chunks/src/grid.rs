// Copyright 2025 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The chunk grid: integer cell coordinates, covered ranges, and per-chunk segments.

use kurbo::{Point, Rect, Vec2};
use vellum_index::{Aabb2D, ObjectId};

use crate::lod::Detail;

/// Integer coordinates of a grid chunk.
///
/// Chunk `(x, y)` covers `[x * size, (x + 1) * size) × [y * size, (y + 1) * size)`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkCoord {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl ChunkCoord {
    /// Create a coordinate.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// World-space origin (top-left corner) of this chunk.
    pub fn origin(self, size: f64) -> Point {
        Point::new(f64::from(self.x) * size, f64::from(self.y) * size)
    }

    /// World-space bounds of this chunk.
    pub fn bounds(self, size: f64) -> Rect {
        Rect::from_origin_size(self.origin(size), (size, size))
    }
}

/// Inclusive rectangle of chunk coordinates.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChunkRange {
    /// First column.
    pub min_x: i32,
    /// First row.
    pub min_y: i32,
    /// Last column (inclusive).
    pub max_x: i32,
    /// Last row (inclusive).
    pub max_y: i32,
}

impl ChunkRange {
    /// Range of chunks overlapped by `rect` on a grid of `size`.
    ///
    /// Min edges are floored. A max edge lying exactly on a chunk boundary does not claim the
    /// next chunk unless the rectangle is degenerate on that axis.
    pub fn covering(rect: Rect, size: f64) -> Self {
        debug_assert!(size > 0.0, "chunk size must be positive");
        let rect = rect.abs();
        let (min_x, max_x) = axis_range(rect.x0, rect.x1, size);
        let (min_y, max_y) = axis_range(rect.y0, rect.y1, size);
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Whether `coord` lies in the range.
    #[inline]
    pub fn contains(&self, coord: ChunkCoord) -> bool {
        (self.min_x..=self.max_x).contains(&coord.x) && (self.min_y..=self.max_y).contains(&coord.y)
    }

    /// Number of chunks in the range.
    pub fn len(&self) -> u64 {
        let w = i64::from(self.max_x) - i64::from(self.min_x) + 1;
        let h = i64::from(self.max_y) - i64::from(self.min_y) + 1;
        w.max(0).unsigned_abs() * h.max(0).unsigned_abs()
    }

    /// Whether the range holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Coordinates in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        (self.min_y..=self.max_y)
            .flat_map(move |y| (self.min_x..=self.max_x).map(move |x| ChunkCoord::new(x, y)))
    }
}

fn axis_range(min: f64, max: f64, size: f64) -> (i32, i32) {
    let first = floor_to_i32(min / size);
    let last = if max > min {
        ceil_to_i32(max / size).saturating_sub(1)
    } else {
        first
    };
    (first, last.max(first))
}

fn floor_to_i32(v: f64) -> i32 {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "float to int casts saturate; chunk indices beyond i32 are clamped."
    )]
    let i = v as i32;
    if f64::from(i) > v { i.saturating_sub(1) } else { i }
}

fn ceil_to_i32(v: f64) -> i32 {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "float to int casts saturate; chunk indices beyond i32 are clamped."
    )]
    let i = v as i32;
    if f64::from(i) < v { i.saturating_add(1) } else { i }
}

/// The portion of one object's bounding box that overlaps one chunk.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    /// Object this segment belongs to.
    pub object: ObjectId,
    /// The object's full world-space bounding box.
    pub object_bounds: Rect,
    /// World-space intersection of the object box with the chunk.
    pub clip: Rect,
    /// [`Segment::clip`] relative to the chunk origin.
    pub local_clip: Rect,
    /// Position of the object's box origin relative to the chunk origin.
    pub offset: Vec2,
    /// Detail level last computed for this segment.
    pub detail: Detail,
}

impl Segment {
    /// Build the segment of `object_bounds` that falls in `chunk`.
    pub fn new(object: ObjectId, object_bounds: Rect, chunk: ChunkCoord, size: f64) -> Self {
        let chunk_bounds = chunk.bounds(size);
        let origin = chunk_bounds.origin().to_vec2();
        let clip = object_bounds.intersect(chunk_bounds);
        Self {
            object,
            object_bounds,
            clip,
            local_clip: clip - origin,
            offset: object_bounds.origin() - chunk_bounds.origin(),
            detail: Detail::Full,
        }
    }
}

/// Convert a Kurbo rectangle to the index's box type.
pub fn rect_to_aabb(r: Rect) -> Aabb2D {
    Aabb2D::new(r.x0, r.y0, r.x1, r.y1)
}

/// Convert an index box to a Kurbo rectangle.
pub fn aabb_to_rect(a: Aabb2D) -> Rect {
    Rect::new(a.min_x, a.min_y, a.max_x, a.max_y)
}
