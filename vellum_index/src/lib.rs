// Copyright 2025 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Vellum Index: a loose quadtree over the bounding boxes of board objects.
//!
//! Vellum Index answers "which objects are in this region?" for an infinite drawing surface
//! holding hundreds of thousands of strokes, images, and text blocks.
//!
//! - Insert, update, and remove axis-aligned bounding boxes keyed by an external [`ObjectId`].
//! - Query by point or intersecting rectangle; results are dense [`Handle`]s.
//! - Rebuild from a caller-supplied object list with [`SpatialIndex::bulk_load`].
//! - Classify objects as [`ObjectFlags::STATIC`] or [`ObjectFlags::DYNAMIC`] from how often their
//!   bounds change, so consumers can skip caching churny content.
//!
//! Object records, quadtree nodes, and each node's intrusive list of object references live in
//! growable [`Arena`]s with index free lists. After warm-up, inserts, moves, and removals
//! recycle slots instead of allocating, and queries reuse an internal traversal stack.
//!
//! The tree is *loose*: node cells are inflated by [`IndexConfig::looseness`] when deciding
//! whether an updated box still belongs to its node and when pruning queries. Small moves
//! therefore rarely re-insert, at the price of visiting a few more nodes per query. Query
//! results are still exact: every listed box is tested against the query itself.
//!
//! This crate does not depend on any geometry crate. Higher layers (like the chunk cache)
//! convert their own rectangles to [`Aabb2D`].
//!
//! # Example
//!
//! ```rust
//! use vellum_index::{Aabb2D, ObjectId, SpatialIndex};
//!
//! let mut idx = SpatialIndex::new();
//! let a = idx.insert(ObjectId(1), Aabb2D::from_xywh(0.0, 0.0, 10.0, 10.0));
//! let _b = idx.insert(ObjectId(2), Aabb2D::from_xywh(1000.0, 1000.0, 10.0, 10.0));
//!
//! // Region query.
//! let hits = idx.query_region(Aabb2D::from_xywh(0.0, 0.0, 20.0, 20.0));
//! assert_eq!(hits, vec![a]);
//!
//! // Move the first object far away; it is re-inserted from the root.
//! idx.update_bounds(ObjectId(1), Aabb2D::from_xywh(5000.0, 5000.0, 10.0, 10.0));
//! assert!(idx.query_point(5.0, 5.0).is_empty());
//! let hit = idx.query_point(5005.0, 5005.0)[0];
//! assert_eq!(idx.resolve(hit), Some(ObjectId(1)));
//! ```
//!
//! ### Float semantics
//!
//! Bounds are assumed finite. Debug builds assert.
//!
//! ### Diagnostics
//!
//! Consistency problems (a listed reference whose object slot was released or reassigned) are
//! purged and reported through the [`log`] facade at `warn` level. Arena growth is reported at
//! `debug`, splits, merges, and root growth at `trace`.

#![no_std]

extern crate alloc;

pub mod arena;
pub mod config;
pub mod index;
mod pool;
pub mod types;

pub use arena::Arena;
pub use config::{ConfigError, IndexConfig};
pub use index::{IndexStats, ObjectView, SpatialIndex};
pub use types::{Aabb2D, Handle, ObjectDesc, ObjectFlags, ObjectId, ObjectKind, SpatialObject};
