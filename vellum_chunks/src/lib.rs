// Copyright 2025 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Vellum Chunks: a Kurbo-native chunk grid with LOD-banded surface caching.
//!
//! The board is cut into fixed-size square chunks. Every object box overlapping a chunk becomes
//! a [`Segment`] of that chunk, carrying the clip rectangle and chunk-local offset needed to draw
//! exactly that part of the object. Each frame, [`ChunkCache::update_visible`] walks the chunks
//! intersecting the view and decides per chunk:
//!
//! - at [`LodBand::Near`], composite the objects live at full detail;
//! - at coarser bands, composite a cached raster where each object is clipped to its segment.
//!
//! A surface is rebuilt only when chunk membership changed since it was built (or it does not
//! exist yet), and a raster also when the coarse band it was drawn at changes. Zooming back and
//! forth across the near threshold therefore reuses both surfaces, and [`LodSelector`] adds
//! hysteresis so the band itself does not flicker.
//!
//! What a surface *is* belongs to the caller, through [`SegmentRenderer`].
//!
//! # Example
//!
//! ```rust
//! use kurbo::{Rect, Vec2};
//! use vellum_chunks::{
//!     ChunkCache, ChunkCoord, ChunkMode, DrawOutcome, SegmentDraw, SegmentRenderer, Viewport,
//! };
//! use vellum_index::{Aabb2D, ObjectDesc, ObjectKind};
//!
//! /// Records which objects each surface holds.
//! struct DisplayLists;
//!
//! impl SegmentRenderer for DisplayLists {
//!     type Surface = Vec<SegmentDraw>;
//!
//!     fn begin(&mut self, _: ChunkCoord, _: Rect, _: ChunkMode, old: Option<Self::Surface>) -> Self::Surface {
//!         let mut list = old.unwrap_or_default();
//!         list.clear();
//!         list
//!     }
//!
//!     fn draw(&mut self, list: &mut Self::Surface, segment: &SegmentDraw) -> DrawOutcome {
//!         list.push(*segment);
//!         DrawOutcome::Drawn
//!     }
//! }
//!
//! let mut cache = ChunkCache::new();
//! let objects = [
//!     ObjectDesc::new(1, ObjectKind::Stroke, Aabb2D::from_xywh(0.0, 0.0, 10.0, 10.0)),
//!     ObjectDesc::new(2, ObjectKind::Image, Aabb2D::from_xywh(1000.0, 0.0, 100.0, 50.0)),
//! ];
//! cache.sync_objects(&objects);
//!
//! let mut selector = cache.lod_selector();
//! let scale = 0.25;
//! let band = selector.select(scale);
//! let viewport = Viewport::new(scale, Vec2::ZERO, 800.0, 600.0, band);
//!
//! let stats = cache.update_visible(&viewport, viewport.world_rect(), &mut DisplayLists);
//! assert_eq!(stats.raster_rebuilds, 2);
//!
//! // Nothing changed: the next frame reuses both rasters.
//! let stats = cache.update_visible(&viewport, viewport.world_rect(), &mut DisplayLists);
//! assert_eq!(stats.rebuilds(), 0);
//! assert_eq!(cache.visible_chunks().count(), 2);
//! ```
//!
//! ### Diagnostics
//!
//! Skipped objects and dropped segments are reported through the [`log`] facade at `debug`,
//! rebuilds and band changes at `trace`.

#![no_std]

extern crate alloc;

pub mod cache;
pub mod config;
pub mod grid;
pub mod lod;

pub use cache::{
    Chunk, ChunkCache, ChunkMode, DrawOutcome, FrameStats, SegmentDraw, SegmentRenderer,
    VisibleChunk,
};
pub use config::{ChunkConfig, ConfigError};
pub use grid::{ChunkCoord, ChunkRange, Segment, aabb_to_rect, rect_to_aabb};
pub use lod::{Detail, DetailThresholds, LodBand, LodConfig, LodSelector, Viewport};
