// Copyright 2025 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Quadtree node pool and the object-reference pool backing each node's intrusive list.

use crate::arena::Arena;
use crate::types::{Aabb2D, Handle};

/// Index of a quadtree node in the [`NodePool`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct NodeIdx(pub(crate) u32);

/// Index of an object reference in the [`RefPool`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct RefIdx(pub(crate) u32);

/// Quadrant order: bit 0 selects the max-x half, bit 1 the max-y half.
pub(crate) const QUADRANTS: usize = 4;

/// A square quadtree cell stored as center and half extent.
#[derive(Clone, Debug)]
pub(crate) struct QuadNode {
    pub(crate) cx: f64,
    pub(crate) cy: f64,
    pub(crate) half: f64,
    pub(crate) depth: u16,
    pub(crate) parent: Option<NodeIdx>,
    pub(crate) children: [Option<NodeIdx>; QUADRANTS],
    /// Head of the intrusive list of object references.
    pub(crate) head: Option<RefIdx>,
    pub(crate) count: u32,
}

impl QuadNode {
    pub(crate) fn new(cx: f64, cy: f64, half: f64, depth: u16, parent: Option<NodeIdx>) -> Self {
        Self {
            cx,
            cy,
            half,
            depth,
            parent,
            children: [None; QUADRANTS],
            head: None,
            count: 0,
        }
    }

    /// Leaf iff every child slot is empty.
    #[inline]
    pub(crate) fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }

    /// Tight cell bounds.
    #[inline]
    pub(crate) fn bounds(&self) -> Aabb2D {
        Aabb2D::from_center(self.cx, self.cy, self.half)
    }

    /// Cell bounds inflated by `looseness` about the center.
    #[inline]
    pub(crate) fn loose_bounds(&self, looseness: f64) -> Aabb2D {
        Aabb2D::from_center(self.cx, self.cy, self.half * looseness)
    }

    /// Quadrant whose cell holds the point.
    #[inline]
    pub(crate) fn quadrant_of(&self, x: f64, y: f64) -> usize {
        usize::from(x >= self.cx) | (usize::from(y >= self.cy) << 1)
    }

    /// Center of the child cell in quadrant `q`.
    #[inline]
    pub(crate) fn child_center(&self, q: usize) -> (f64, f64) {
        let quarter = self.half * 0.5;
        let dx = if q & 1 == 1 { quarter } else { -quarter };
        let dy = if q & 2 == 2 { quarter } else { -quarter };
        (self.cx + dx, self.cy + dy)
    }
}

/// One link of a node's intrusive object list.
#[derive(Copy, Clone, Debug)]
pub(crate) struct ObjectRef {
    pub(crate) handle: Handle,
    pub(crate) next: Option<RefIdx>,
}

/// Pool of quadtree nodes.
#[derive(Debug)]
pub(crate) struct NodePool {
    arena: Arena<QuadNode>,
}

impl NodePool {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            arena: Arena::with_capacity("node", capacity),
        }
    }

    pub(crate) fn alloc(&mut self, node: QuadNode) -> NodeIdx {
        NodeIdx(self.arena.alloc(node))
    }

    pub(crate) fn release(&mut self, idx: NodeIdx) {
        let _ = self.arena.release(idx.0);
    }

    /// Access a node; panics if `idx` is dangling.
    #[inline]
    pub(crate) fn node(&self, idx: NodeIdx) -> &QuadNode {
        self.arena.get(idx.0).expect("dangling NodeIdx")
    }

    /// Access a node mutably; panics if `idx` is dangling.
    #[inline]
    pub(crate) fn node_mut(&mut self, idx: NodeIdx) -> &mut QuadNode {
        self.arena.get_mut(idx.0).expect("dangling NodeIdx")
    }

    pub(crate) fn len(&self) -> usize {
        self.arena.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    pub(crate) fn reserve(&mut self, additional: usize) {
        self.arena.reserve(additional);
    }

    pub(crate) fn clear(&mut self) {
        self.arena.clear();
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (NodeIdx, &QuadNode)> + '_ {
        self.arena.iter().map(|(i, n)| (NodeIdx(i), n))
    }
}

/// Pool of object references, recycled independently of object handles.
#[derive(Debug)]
pub(crate) struct RefPool {
    arena: Arena<ObjectRef>,
}

impl RefPool {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            arena: Arena::with_capacity("reference", capacity),
        }
    }

    pub(crate) fn alloc(&mut self, handle: Handle, next: Option<RefIdx>) -> RefIdx {
        RefIdx(self.arena.alloc(ObjectRef { handle, next }))
    }

    pub(crate) fn release(&mut self, idx: RefIdx) {
        let _ = self.arena.release(idx.0);
    }

    /// Access a reference; panics if `idx` is dangling.
    #[inline]
    pub(crate) fn get(&self, idx: RefIdx) -> ObjectRef {
        *self.arena.get(idx.0).expect("dangling RefIdx")
    }

    #[inline]
    pub(crate) fn set_next(&mut self, idx: RefIdx, next: Option<RefIdx>) {
        self.arena.get_mut(idx.0).expect("dangling RefIdx").next = next;
    }

    pub(crate) fn len(&self) -> usize {
        self.arena.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    pub(crate) fn reserve(&mut self, additional: usize) {
        self.arena.reserve(additional);
    }

    pub(crate) fn clear(&mut self) {
        self.arena.clear();
    }
}
