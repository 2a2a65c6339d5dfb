// Copyright 2025 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Primitive geometry types, object identity, and classification flags.

/// Axis-aligned bounding box in 2D world space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb2D {
    /// Minimum x (left)
    pub min_x: f64,
    /// Minimum y (top)
    pub min_y: f64,
    /// Maximum x (right)
    pub max_x: f64,
    /// Maximum y (bottom)
    pub max_y: f64,
}

impl Aabb2D {
    /// Create a new AABB from min/max corners.
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Create an AABB from origin and size.
    pub const fn from_xywh(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x + w,
            max_y: y + h,
        }
    }

    /// Create a square AABB from a center and half extent.
    pub const fn from_center(cx: f64, cy: f64, half: f64) -> Self {
        Self {
            min_x: cx - half,
            min_y: cy - half,
            max_x: cx + half,
            max_y: cy + half,
        }
    }

    /// Width of the box (may be negative for inverted boxes).
    #[inline]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the box (may be negative for inverted boxes).
    #[inline]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Center point of the box.
    #[inline]
    pub fn center(&self) -> (f64, f64) {
        (
            0.5 * (self.min_x + self.max_x),
            0.5 * (self.min_y + self.max_y),
        )
    }

    /// Whether this AABB contains the point (edges inclusive).
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.min_x <= x && self.min_y <= y && x <= self.max_x && y <= self.max_y
    }

    /// Whether `other` lies fully inside this AABB (edges inclusive).
    pub fn contains(&self, other: &Self) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && other.max_x <= self.max_x
            && other.max_y <= self.max_y
    }

    /// Whether the two boxes overlap or touch.
    pub fn intersects(&self, other: &Self) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    /// The intersection of two AABBs. Check [`Aabb2D::is_empty`] on the result.
    pub fn intersect(&self, other: &Self) -> Self {
        Self {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        }
    }

    /// Smallest AABB containing both boxes.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Return true if the AABB is inverted (no extent). Degenerate points and lines are not empty.
    pub fn is_empty(&self) -> bool {
        self.max_x < self.min_x || self.max_y < self.min_y
    }

    /// Whether every coordinate is finite.
    pub fn is_finite(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
    }
}

/// External identifier of a logical object on the board.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u64);

/// Dense arena index identifying an object's slot in a [`SpatialIndex`](crate::SpatialIndex).
///
/// Handles are recycled: after an object is removed its handle may be handed to the next
/// inserted object. Resolve a handle through the index ([`SpatialIndex::resolve`](crate::SpatialIndex::resolve))
/// rather than caching the handle-to-object mapping.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(pub(crate) u32);

impl Handle {
    /// Raw slot index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Type tag of a logical object.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Freehand stroke.
    #[default]
    Stroke,
    /// Placed raster image.
    Image,
    /// Text block.
    Text,
    /// Geometric shape.
    Shape,
}

bitflags::bitflags! {
    /// Classification flags tracked per object record.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ObjectFlags: u8 {
        /// Bounds change rarely; safe to cache.
        const STATIC  = 0b0000_0001;
        /// Bounds churned past the threshold within the current window.
        const DYNAMIC = 0b0000_0010;
        /// Bounds changed since the last [`SpatialIndex::drain_dirty`](crate::SpatialIndex::drain_dirty).
        const DIRTY   = 0b0000_0100;
        /// Tombstone; the record is being released.
        const DELETED = 0b0000_1000;
    }
}

/// Read access to an externally owned board object.
///
/// The index never owns object content. It only reads identity, bounds, draw order,
/// and the tombstone flag through this trait.
pub trait SpatialObject {
    /// Unique identifier.
    fn id(&self) -> ObjectId;

    /// Current bounding box, or `None` when it cannot be computed yet.
    fn bounds(&self) -> Option<Aabb2D>;

    /// Optional explicit draw order. Higher draws on top.
    fn draw_order(&self) -> Option<i64> {
        None
    }

    /// Whether the object has been deleted by its owner.
    fn is_deleted(&self) -> bool {
        false
    }
}

/// Plain description of a board object, useful for loading and tests.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectDesc {
    /// Identifier.
    pub id: ObjectId,
    /// Type tag.
    pub kind: ObjectKind,
    /// Cached bounding box.
    pub bounds: Option<Aabb2D>,
    /// Explicit draw order, if any.
    pub draw_order: Option<i64>,
    /// Tombstone flag.
    pub deleted: bool,
}

impl ObjectDesc {
    /// A live object of the given kind with known bounds.
    pub const fn new(id: u64, kind: ObjectKind, bounds: Aabb2D) -> Self {
        Self {
            id: ObjectId(id),
            kind,
            bounds: Some(bounds),
            draw_order: None,
            deleted: false,
        }
    }
}

impl SpatialObject for ObjectDesc {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn bounds(&self) -> Option<Aabb2D> {
        self.bounds
    }

    fn draw_order(&self) -> Option<i64> {
        self.draw_order
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }
}
