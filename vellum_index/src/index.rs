// Copyright 2025 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Loose quadtree spatial index with arena-backed handles.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use crate::arena::Arena;
use crate::config::{ConfigError, IndexConfig};
use crate::pool::{NodeIdx, NodePool, ObjectRef, QUADRANTS, QuadNode, RefIdx, RefPool};
use crate::types::{Aabb2D, Handle, ObjectFlags, ObjectId, SpatialObject};

/// Doublings needed to grow a 1-unit root past `f64::MAX`.
const MAX_ROOT_GROWTH: usize = 1100;

#[derive(Copy, Clone, Debug, Default)]
struct Churn {
    window_start: u64,
    changes: u32,
}

#[derive(Clone, Debug)]
struct ObjectSlot {
    id: ObjectId,
    bounds: Aabb2D,
    flags: ObjectFlags,
    node: Option<NodeIdx>,
    reference: Option<RefIdx>,
    draw_order: Option<i64>,
    sequence: u64,
    churn: Churn,
}

/// Snapshot of an indexed object, returned by [`SpatialIndex::get`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObjectView {
    /// External identifier.
    pub id: ObjectId,
    /// Current handle.
    pub handle: Handle,
    /// Bounding box as last pushed into the index.
    pub bounds: Aabb2D,
    /// Classification flags.
    pub flags: ObjectFlags,
    /// Explicit draw order, if any.
    pub draw_order: Option<i64>,
    /// Depth of the quadtree node holding the object.
    pub depth: u16,
}

/// Occupancy summary, returned by [`SpatialIndex::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Live objects.
    pub objects: usize,
    /// Live quadtree nodes.
    pub nodes: usize,
    /// Live object references.
    pub references: usize,
    /// Deepest live node.
    pub max_depth: u16,
    /// Object slots available before growth.
    pub object_capacity: usize,
    /// Node slots available before growth.
    pub node_capacity: usize,
    /// Reference slots available before growth.
    pub reference_capacity: usize,
}

/// Loose quadtree over object bounding boxes.
///
/// Every object is listed at exactly one node: the deepest node whose cell fully contains the
/// box at insertion time. Bounds updates keep the object in place while the new box stays
/// within the node's loose bounds (cell inflated by [`IndexConfig::looseness`]), so region
/// queries test loose bounds while descending and exact boxes at the leaves.
pub struct SpatialIndex {
    config: IndexConfig,
    objects: Arena<ObjectSlot>,
    ids: BTreeMap<ObjectId, Handle>,
    nodes: NodePool,
    refs: RefPool,
    root: Option<NodeIdx>,
    /// Index-wide bounds update counter; drives churn windows.
    clock: u64,
    next_sequence: u64,
    dirty: Vec<Handle>,
    /// Ids removed since the last drain.
    removed: BTreeSet<ObjectId>,
    /// Traversal scratch reused across calls.
    stack: Vec<NodeIdx>,
}

impl core::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("objects", &self.ids.len())
            .field("nodes", &self.nodes.len())
            .field("references", &self.refs.len())
            .field("root", &self.root)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialIndex {
    /// Create an empty index with the default configuration.
    pub fn new() -> Self {
        Self::build(IndexConfig::default())
    }

    /// Create an empty index, rejecting unusable configurations.
    pub fn with_config(config: IndexConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: IndexConfig) -> Self {
        let capacity = config.initial_capacity;
        Self {
            config,
            objects: Arena::with_capacity("object", capacity),
            ids: BTreeMap::new(),
            nodes: NodePool::with_capacity(capacity / 4 + 1),
            refs: RefPool::with_capacity(capacity),
            root: None,
            clock: 0,
            next_sequence: 0,
            dirty: Vec::new(),
            removed: BTreeSet::new(),
            stack: Vec::new(),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Number of indexed objects.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True if no object is indexed.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether `id` is indexed.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.ids.contains_key(&id)
    }

    /// Handle currently assigned to `id`.
    pub fn handle_of(&self, id: ObjectId) -> Option<Handle> {
        self.ids.get(&id).copied()
    }

    /// Object currently occupying `handle`.
    pub fn resolve(&self, handle: Handle) -> Option<ObjectId> {
        self.live_slot(handle).map(|s| s.id)
    }

    /// Bounding box stored for `handle`.
    pub fn bounds(&self, handle: Handle) -> Option<Aabb2D> {
        self.live_slot(handle).map(|s| s.bounds)
    }

    /// Classification flags for `handle`.
    pub fn flags(&self, handle: Handle) -> Option<ObjectFlags> {
        self.live_slot(handle).map(|s| s.flags)
    }

    /// Look up an object by identifier.
    pub fn get(&self, id: ObjectId) -> Option<ObjectView> {
        let handle = self.handle_of(id)?;
        let slot = self.live_slot(handle)?;
        Some(ObjectView {
            id: slot.id,
            handle,
            bounds: slot.bounds,
            flags: slot.flags,
            draw_order: slot.draw_order,
            depth: slot.node.map(|n| self.nodes.node(n).depth).unwrap_or(0),
        })
    }

    /// Insert an object, or update its bounds if it is already indexed.
    pub fn insert(&mut self, id: ObjectId, bounds: Aabb2D) -> Handle {
        debug_assert!(bounds.is_finite(), "object bounds must be finite");
        if let Some(&handle) = self.ids.get(&id) {
            self.update_bounds(id, bounds);
            return handle;
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let handle = Handle(self.objects.alloc(ObjectSlot {
            id,
            bounds,
            flags: ObjectFlags::STATIC | ObjectFlags::DIRTY,
            node: None,
            reference: None,
            draw_order: None,
            sequence,
            churn: Churn {
                window_start: self.clock,
                changes: 0,
            },
        }));
        self.ids.insert(id, handle);
        self.dirty.push(handle);
        self.place(handle, bounds);
        handle
    }

    /// Replace the bounding box of `id`. Returns `false` if `id` is not indexed.
    ///
    /// The object stays at its node while the new box fits the node's loose bounds;
    /// otherwise it is detached and re-inserted from the root.
    pub fn update_bounds(&mut self, id: ObjectId, bounds: Aabb2D) -> bool {
        debug_assert!(bounds.is_finite(), "object bounds must be finite");
        let Some(&handle) = self.ids.get(&id) else {
            return false;
        };
        let Some(slot) = self.objects.get_mut(handle.0) else {
            log::warn!("object {id:?} maps to released handle {handle:?}");
            return false;
        };
        if slot.bounds == bounds {
            return true;
        }
        slot.bounds = bounds;
        let node = slot.node;
        self.mark_dirty(handle);
        self.record_churn(handle);

        let looseness = self.config.looseness;
        let fits = node.is_some_and(|n| {
            self.nodes
                .node(n)
                .loose_bounds(looseness)
                .contains(&bounds)
        });
        if !fits {
            if let Some(old) = self.unlink(handle) {
                self.collapse_from(old);
            }
            self.place(handle, bounds);
        }
        true
    }

    /// Remove `id`. Returns `false` if it was not indexed.
    pub fn remove(&mut self, id: ObjectId) -> bool {
        let Some(handle) = self.ids.remove(&id) else {
            return false;
        };
        let old = self.unlink(handle);
        let released = self.objects.release(handle.0);
        debug_assert_eq!(released.map(|s| s.id), Some(id), "id map out of sync");
        self.removed.insert(id);
        if let Some(old) = old {
            self.collapse_from(old);
        }
        true
    }

    /// Set or clear the explicit draw order of `id`.
    pub fn set_draw_order(&mut self, id: ObjectId, order: Option<i64>) -> bool {
        let Some(&handle) = self.ids.get(&id) else {
            return false;
        };
        match self.objects.get_mut(handle.0) {
            Some(slot) => {
                slot.draw_order = order;
                true
            }
            None => false,
        }
    }

    /// Sort handles back-to-front.
    ///
    /// Objects with an explicit draw order sort by it; the rest use their insertion
    /// sequence as their order. Ties break by insertion sequence.
    pub fn sort_by_draw_order(&self, handles: &mut [Handle]) {
        handles.sort_by_key(|h| self.order_key(*h));
    }

    /// Handles whose objects are currently classified dynamic.
    pub fn dynamic_handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.objects
            .iter()
            .filter(|(_, s)| s.flags.contains(ObjectFlags::DYNAMIC))
            .map(|(i, _)| Handle(i))
    }

    /// Collect the ids of objects inserted, moved, or removed since the last drain, clearing
    /// the [`ObjectFlags::DIRTY`] flag of those still indexed. `out` is cleared first.
    ///
    /// Live ids come first in change order, then removed ids in ascending order. An id removed
    /// and inserted again before the drain is reported once, as live.
    pub fn drain_dirty(&mut self, out: &mut Vec<ObjectId>) {
        out.clear();
        for handle in self.dirty.drain(..) {
            if let Some(slot) = self.objects.get_mut(handle.0)
                && slot.flags.contains(ObjectFlags::DIRTY)
            {
                slot.flags.remove(ObjectFlags::DIRTY);
                out.push(slot.id);
            }
        }
        let ids = &self.ids;
        out.extend(
            core::mem::take(&mut self.removed)
                .into_iter()
                .filter(|id| !ids.contains_key(id)),
        );
    }

    /// Handles of objects whose box intersects `region`. Results are unordered.
    pub fn query_region(&mut self, region: Aabb2D) -> Vec<Handle> {
        let mut out = Vec::new();
        self.query_region_into(region, &mut out);
        out
    }

    /// Like [`SpatialIndex::query_region`], writing into a caller-owned buffer (cleared first).
    pub fn query_region_into(&mut self, region: Aabb2D, out: &mut Vec<Handle>) {
        self.query_with(&region, |b| b.intersects(&region), out);
    }

    /// Handles of objects whose box contains the point. Results are unordered.
    pub fn query_point(&mut self, x: f64, y: f64) -> Vec<Handle> {
        let mut out = Vec::new();
        self.query_point_into(x, y, &mut out);
        out
    }

    /// Like [`SpatialIndex::query_point`], writing into a caller-owned buffer (cleared first).
    pub fn query_point_into(&mut self, x: f64, y: f64, out: &mut Vec<Handle>) {
        let probe = Aabb2D::new(x, y, x, y);
        self.query_with(&probe, |b| b.contains_point(x, y), out);
    }

    /// Rebuild the index from a caller-supplied object list.
    ///
    /// Deleted objects and objects without bounds are skipped. Returns the number of
    /// indexed objects.
    pub fn bulk_load<O: SpatialObject>(&mut self, objects: &[O]) -> usize {
        self.clear();
        let mut extent: Option<Aabb2D> = None;
        for o in objects.iter().filter(|o| !o.is_deleted()) {
            if let Some(b) = o.bounds() {
                extent = Some(extent.map_or(b, |e| e.union(&b)));
            }
        }
        let Some(extent) = extent else {
            return 0;
        };
        self.objects.reserve(objects.len());
        self.refs.reserve(objects.len());
        let per_node = self.config.max_objects_per_node as usize;
        self.nodes.reserve(objects.len() / per_node * 2 + 1);
        let fresh = self.fresh_root(&extent);
        self.root = Some(self.nodes.alloc(fresh));

        for o in objects {
            if o.is_deleted() {
                continue;
            }
            let Some(bounds) = o.bounds() else {
                log::debug!("skipping object {:?}: no bounding box", o.id());
                continue;
            };
            let handle = self.insert(o.id(), bounds);
            if let Some(slot) = self.objects.get_mut(handle.0) {
                slot.draw_order = o.draw_order();
            }
        }
        self.ids.len()
    }

    /// Drop every object and node, keeping arena capacity.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.ids.clear();
        self.nodes.clear();
        self.refs.clear();
        self.root = None;
        self.dirty.clear();
        self.removed.clear();
    }

    /// Occupancy summary.
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            objects: self.ids.len(),
            nodes: self.nodes.len(),
            references: self.refs.len(),
            max_depth: self.nodes.iter().map(|(_, n)| n.depth).max().unwrap_or(0),
            object_capacity: self.objects.capacity(),
            node_capacity: self.nodes.capacity(),
            reference_capacity: self.refs.capacity(),
        }
    }

    // --- internals ---

    fn live_slot(&self, handle: Handle) -> Option<&ObjectSlot> {
        self.objects
            .get(handle.0)
            .filter(|s| !s.flags.contains(ObjectFlags::DELETED))
    }

    fn order_key(&self, handle: Handle) -> (i64, u64) {
        match self.live_slot(handle) {
            Some(slot) => {
                let implicit = i64::try_from(slot.sequence).unwrap_or(i64::MAX);
                (slot.draw_order.unwrap_or(implicit), slot.sequence)
            }
            None => (i64::MAX, u64::MAX),
        }
    }

    fn mark_dirty(&mut self, handle: Handle) {
        if let Some(slot) = self.objects.get_mut(handle.0)
            && !slot.flags.contains(ObjectFlags::DIRTY)
        {
            slot.flags.insert(ObjectFlags::DIRTY);
            self.dirty.push(handle);
        }
    }

    fn record_churn(&mut self, handle: Handle) {
        self.clock += 1;
        let clock = self.clock;
        let window = u64::from(self.config.churn_window);
        let threshold = self.config.churn_threshold;
        let Some(slot) = self.objects.get_mut(handle.0) else {
            return;
        };
        let churn = &mut slot.churn;
        if clock - churn.window_start >= window {
            if churn.changes <= threshold {
                slot.flags.remove(ObjectFlags::DYNAMIC);
                slot.flags.insert(ObjectFlags::STATIC);
            }
            churn.window_start = clock;
            churn.changes = 0;
        }
        churn.changes += 1;
        if churn.changes > threshold {
            slot.flags.remove(ObjectFlags::STATIC);
            slot.flags.insert(ObjectFlags::DYNAMIC);
        }
    }

    fn place(&mut self, handle: Handle, bounds: Aabb2D) {
        let root = self.ensure_root(&bounds);
        let node = self.descend(root, &bounds);
        self.link(node, handle);
        self.split_overflowing(node);
    }

    fn fresh_root(&self, bounds: &Aabb2D) -> QuadNode {
        let (cx, cy) = bounds.center();
        // A full extent as half extent leaves slack against rounding at the edges.
        let half = bounds
            .width()
            .max(bounds.height())
            .max(self.config.min_root_half_extent);
        QuadNode::new(cx, cy, half, 0, None)
    }

    fn ensure_root(&mut self, bounds: &Aabb2D) -> NodeIdx {
        let Some(mut root) = self.root else {
            let fresh = self.fresh_root(bounds);
            let root = self.nodes.alloc(fresh);
            self.root = Some(root);
            return root;
        };
        for _ in 0..MAX_ROOT_GROWTH {
            let node = self.nodes.node(root);
            if node.bounds().contains(bounds) {
                return root;
            }
            if node.is_leaf() && node.count == 0 {
                let fresh = self.fresh_root(bounds);
                *self.nodes.node_mut(root) = fresh;
                return root;
            }
            root = self.grow_root(root, bounds);
        }
        log::warn!("root growth gave up before covering {bounds:?}");
        root
    }

    /// Double the root toward `bounds`; the old root becomes one quadrant of the new one.
    fn grow_root(&mut self, old: NodeIdx, bounds: &Aabb2D) -> NodeIdx {
        let (bx, by) = bounds.center();
        let (cx, cy, half) = {
            let n = self.nodes.node(old);
            (n.cx, n.cy, n.half)
        };
        let sx = if bx < cx { -1.0 } else { 1.0 };
        let sy = if by < cy { -1.0 } else { 1.0 };
        let root = self.nodes.alloc(QuadNode::new(
            cx + sx * half,
            cy + sy * half,
            half * 2.0,
            0,
            None,
        ));
        let old_quadrant = self.nodes.node(root).quadrant_of(cx, cy);
        for q in 0..QUADRANTS {
            let child = if q == old_quadrant {
                old
            } else {
                let (qx, qy) = self.nodes.node(root).child_center(q);
                self.nodes
                    .alloc(QuadNode::new(qx, qy, half, 1, Some(root)))
            };
            self.nodes.node_mut(root).children[q] = Some(child);
        }
        self.nodes.node_mut(old).parent = Some(root);
        self.shift_depths(old);
        self.root = Some(root);
        log::trace!("root grew to half extent {}", half * 2.0);
        root
    }

    fn shift_depths(&mut self, top: NodeIdx) {
        let mut stack = core::mem::take(&mut self.stack);
        stack.clear();
        stack.push(top);
        while let Some(n) = stack.pop() {
            let node = self.nodes.node_mut(n);
            node.depth = node.depth.saturating_add(1);
            stack.extend(node.children.iter().flatten().copied());
        }
        self.stack = stack;
    }

    /// Deepest node below `from` whose cell fully contains `bounds`.
    fn descend(&self, from: NodeIdx, bounds: &Aabb2D) -> NodeIdx {
        let (bx, by) = bounds.center();
        let mut current = from;
        loop {
            let node = self.nodes.node(current);
            let Some(child) = node.children[node.quadrant_of(bx, by)] else {
                return current;
            };
            if !self.nodes.node(child).bounds().contains(bounds) {
                return current;
            }
            current = child;
        }
    }

    fn link(&mut self, node: NodeIdx, handle: Handle) {
        let head = self.nodes.node(node).head;
        let r = self.refs.alloc(handle, head);
        let n = self.nodes.node_mut(node);
        n.head = Some(r);
        n.count += 1;
        if let Some(slot) = self.objects.get_mut(handle.0) {
            slot.node = Some(node);
            slot.reference = Some(r);
        }
    }

    /// Detach `handle` from its node, returning the node it was listed at.
    fn unlink(&mut self, handle: Handle) -> Option<NodeIdx> {
        let slot = self.objects.get_mut(handle.0)?;
        let node = slot.node.take()?;
        let reference = slot.reference.take()?;
        if self.splice_out(node, reference) {
            self.refs.release(reference);
        } else {
            log::warn!("reference {reference:?} for handle {handle:?} missing from node {node:?}");
        }
        Some(node)
    }

    fn splice_out(&mut self, node: NodeIdx, target: RefIdx) -> bool {
        let mut prev: Option<RefIdx> = None;
        let mut cur = self.nodes.node(node).head;
        while let Some(r) = cur {
            let next = self.refs.get(r).next;
            if r == target {
                match prev {
                    Some(p) => self.refs.set_next(p, next),
                    None => self.nodes.node_mut(node).head = next,
                }
                self.nodes.node_mut(node).count -= 1;
                return true;
            }
            prev = Some(r);
            cur = next;
        }
        false
    }

    fn split_overflowing(&mut self, start: NodeIdx) {
        let max = self.config.max_objects_per_node;
        let max_depth = self.config.max_depth;
        let mut stack = core::mem::take(&mut self.stack);
        stack.clear();
        stack.push(start);
        while let Some(n) = stack.pop() {
            let node = self.nodes.node(n);
            if !node.is_leaf() || node.count <= max || node.depth >= max_depth {
                continue;
            }
            self.split(n);
            stack.extend(self.nodes.node(n).children.iter().flatten().copied());
        }
        self.stack = stack;
    }

    /// Give a leaf four children and push down every reference a child fully contains.
    fn split(&mut self, n: NodeIdx) {
        let (depth, half) = {
            let node = self.nodes.node(n);
            (node.depth, node.half)
        };
        let mut children = [None; QUADRANTS];
        for (q, child) in children.iter_mut().enumerate() {
            let (cx, cy) = self.nodes.node(n).child_center(q);
            *child = Some(self.nodes.alloc(QuadNode::new(
                cx,
                cy,
                half * 0.5,
                depth + 1,
                Some(n),
            )));
        }
        self.nodes.node_mut(n).children = children;

        let mut cur = self.nodes.node_mut(n).head.take();
        let mut kept: Option<RefIdx> = None;
        let mut kept_count = 0_u32;
        while let Some(r) = cur {
            let ObjectRef { handle, next } = self.refs.get(r);
            cur = next;
            let target = self.objects.get(handle.0).and_then(|slot| {
                let (bx, by) = slot.bounds.center();
                let child = children[self.nodes.node(n).quadrant_of(bx, by)]?;
                self.nodes
                    .node(child)
                    .bounds()
                    .contains(&slot.bounds)
                    .then_some(child)
            });
            match target {
                Some(child) => {
                    let c = self.nodes.node_mut(child);
                    self.refs.set_next(r, c.head);
                    c.head = Some(r);
                    c.count += 1;
                    if let Some(slot) = self.objects.get_mut(handle.0) {
                        slot.node = Some(child);
                    }
                }
                None => {
                    self.refs.set_next(r, kept);
                    kept = Some(r);
                    kept_count += 1;
                }
            }
        }
        let node = self.nodes.node_mut(n);
        node.head = kept;
        node.count = kept_count;
        log::trace!("split node {n:?} at depth {depth}, {kept_count} references stay");
    }

    /// Collapse underflowing sibling leaves, walking from `node` toward the root.
    fn collapse_from(&mut self, node: NodeIdx) {
        let start = self.nodes.node(node);
        let mut current = if start.is_leaf() {
            start.parent
        } else {
            Some(node)
        };
        while let Some(n) = current {
            if !self.try_collapse(n) {
                break;
            }
            current = self.nodes.node(n).parent;
        }
    }

    fn try_collapse(&mut self, parent: NodeIdx) -> bool {
        let node = self.nodes.node(parent);
        let own = node.count;
        let children = node.children;
        let mut combined = 0_u32;
        for child in children.iter().flatten() {
            let c = self.nodes.node(*child);
            if !c.is_leaf() {
                return false;
            }
            combined += c.count;
        }
        if combined >= self.config.merge_threshold
            || own + combined > self.config.max_objects_per_node
        {
            return false;
        }
        for child in children.into_iter().flatten() {
            let mut cur = self.nodes.node(child).head;
            while let Some(r) = cur {
                let ObjectRef { handle, next } = self.refs.get(r);
                cur = next;
                let p = self.nodes.node_mut(parent);
                self.refs.set_next(r, p.head);
                p.head = Some(r);
                p.count += 1;
                if let Some(slot) = self.objects.get_mut(handle.0) {
                    slot.node = Some(parent);
                }
            }
            self.nodes.release(child);
        }
        self.nodes.node_mut(parent).children = [None; QUADRANTS];
        log::trace!("collapsed children of node {parent:?}, absorbed {combined} references");
        true
    }

    fn query_with(
        &mut self,
        region: &Aabb2D,
        hit: impl Fn(&Aabb2D) -> bool,
        out: &mut Vec<Handle>,
    ) {
        out.clear();
        let Some(root) = self.root else {
            return;
        };
        let looseness = self.config.looseness;
        let mut stack = core::mem::take(&mut self.stack);
        stack.clear();
        stack.push(root);
        while let Some(n) = stack.pop() {
            let node = self.nodes.node(n);
            if !node.loose_bounds(looseness).intersects(region) {
                continue;
            }
            let children = node.children;
            if node.head.is_some() {
                self.collect(n, &hit, out);
            }
            for child in children.into_iter().flatten() {
                let c = self.nodes.node(child);
                if c.count > 0 || !c.is_leaf() {
                    stack.push(child);
                }
            }
        }
        self.stack = stack;
    }

    /// Walk `n`'s reference list, pushing hits and purging stale references.
    fn collect(&mut self, n: NodeIdx, hit: &impl Fn(&Aabb2D) -> bool, out: &mut Vec<Handle>) {
        let mut prev: Option<RefIdx> = None;
        let mut cur = self.nodes.node(n).head;
        while let Some(r) = cur {
            let ObjectRef { handle, next } = self.refs.get(r);
            cur = next;
            let live = self.objects.get(handle.0).filter(|s| {
                s.reference == Some(r) && !s.flags.contains(ObjectFlags::DELETED)
            });
            if let Some(slot) = live {
                if hit(&slot.bounds) {
                    out.push(handle);
                }
                prev = Some(r);
                continue;
            }
            log::warn!("purging stale reference {r:?} to handle {handle:?} from node {n:?}");
            match prev {
                Some(p) => self.refs.set_next(p, next),
                None => self.nodes.node_mut(n).head = next,
            }
            self.nodes.node_mut(n).count -= 1;
            self.refs.release(r);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ObjectDesc, ObjectKind};
    use alloc::vec;

    fn id(n: u64) -> ObjectId {
        ObjectId(n)
    }

    struct Rng(u64);

    impl Rng {
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
            (v as f64) / ((1_u64 << 53) as f64)
        }

        fn rect(&mut self, span: f64, max_size: f64) -> Aabb2D {
            let x = self.next_f64() * span - span * 0.5;
            let y = self.next_f64() * span - span * 0.5;
            let w = self.next_f64() * max_size;
            let h = self.next_f64() * max_size;
            Aabb2D::from_xywh(x, y, w, h)
        }
    }

    /// Walk the whole structure and check list, count, parent, and looseness invariants.
    fn assert_consistent(idx: &SpatialIndex) {
        let looseness = idx.config.looseness;
        let mut listed = 0_usize;
        for (n, node) in idx.nodes.iter() {
            let mut len = 0_u32;
            let mut cur = node.head;
            while let Some(r) = cur {
                let ObjectRef { handle, next } = idx.refs.get(r);
                let slot = idx.objects.get(handle.0).expect("listed handle must be live");
                assert_eq!(slot.node, Some(n), "slot must point back at its node");
                assert_eq!(slot.reference, Some(r), "slot must point back at its reference");
                assert!(
                    node.loose_bounds(looseness).contains(&slot.bounds),
                    "object must lie within its node's loose bounds"
                );
                len += 1;
                cur = next;
            }
            assert_eq!(len, node.count, "count must match list length");
            listed += len as usize;
            let leaves = node.children.iter().filter(|c| c.is_none()).count();
            assert!(leaves == 0 || leaves == QUADRANTS, "children are all or nothing");
            if node.is_leaf() && node.depth < idx.config.max_depth {
                assert!(
                    node.count <= idx.config.max_objects_per_node,
                    "leaf above capacity below max depth"
                );
            }
            for child in node.children.iter().flatten() {
                assert_eq!(idx.nodes.node(*child).parent, Some(n), "parent link");
                assert_eq!(idx.nodes.node(*child).depth, node.depth + 1, "depth link");
            }
        }
        assert_eq!(listed, idx.len(), "every object listed exactly once");
    }

    #[test]
    fn insert_query_remove_round_trip() {
        let mut idx = SpatialIndex::new();
        let b = Aabb2D::from_xywh(10.0, 10.0, 5.0, 5.0);
        let h = idx.insert(id(1), b);
        assert_eq!(idx.query_region(b), vec![h]);
        assert!(idx.remove(id(1)));
        assert!(idx.get(id(1)).is_none());
        assert!(idx.query_region(b).is_empty());
        assert!(!idx.remove(id(1)), "double remove is a no-op");
        assert_consistent(&idx);
    }

    #[test]
    fn region_query_returns_only_overlapping_objects() {
        let mut idx = SpatialIndex::new();
        let a = idx.insert(id(1), Aabb2D::from_xywh(0.0, 0.0, 10.0, 10.0));
        idx.insert(id(2), Aabb2D::from_xywh(1000.0, 1000.0, 10.0, 10.0));
        idx.insert(id(3), Aabb2D::from_xywh(2000.0, 0.0, 10.0, 10.0));
        let hits = idx.query_region(Aabb2D::from_xywh(0.0, 0.0, 20.0, 20.0));
        assert_eq!(hits, vec![a]);
        assert_consistent(&idx);
    }

    #[test]
    fn point_query_hits_containing_boxes() {
        let mut idx = SpatialIndex::new();
        let a = idx.insert(id(1), Aabb2D::new(0.0, 0.0, 10.0, 10.0));
        let b = idx.insert(id(2), Aabb2D::new(5.0, 5.0, 15.0, 15.0));
        let mut hits = idx.query_point(6.0, 6.0);
        hits.sort();
        assert_eq!(hits, vec![a, b]);
        assert_eq!(idx.query_point(12.0, 12.0), vec![b]);
        assert!(idx.query_point(-1.0, 0.0).is_empty());
    }

    #[test]
    fn randomized_queries_match_brute_force() {
        let mut rng = Rng(0x9E37_79B9_7F4A_7C15);
        let mut idx = SpatialIndex::with_config(IndexConfig {
            max_objects_per_node: 4,
            merge_threshold: 2,
            ..IndexConfig::default()
        })
        .unwrap();
        let mut boxes: BTreeMap<ObjectId, Aabb2D> = BTreeMap::new();
        for n in 0..1500 {
            let b = rng.rect(20_000.0, 300.0);
            idx.insert(id(n), b);
            boxes.insert(id(n), b);
        }
        for step in 0..1500_u64 {
            let target = id(rng.next_u64() % 1500);
            match step % 3 {
                0 => {
                    // Small nudge: usually stays in place.
                    if let Some(b) = boxes.get_mut(&target) {
                        let dx = rng.next_f64() * 20.0 - 10.0;
                        *b = Aabb2D::new(b.min_x + dx, b.min_y, b.max_x + dx, b.max_y);
                        assert!(idx.update_bounds(target, *b));
                    }
                }
                1 => {
                    // Long jump, sometimes far outside the current root.
                    let b = rng.rect(80_000.0, 500.0);
                    idx.insert(target, b);
                    boxes.insert(target, b);
                }
                _ => {
                    assert_eq!(idx.remove(target), boxes.remove(&target).is_some());
                }
            }
        }
        assert_consistent(&idx);

        for _ in 0..200 {
            let q = rng.rect(60_000.0, 8_000.0);
            let mut got: Vec<ObjectId> = idx
                .query_region(q)
                .into_iter()
                .map(|h| idx.resolve(h).unwrap())
                .collect();
            got.sort();
            let expected: Vec<ObjectId> = boxes
                .iter()
                .filter(|(_, b)| b.intersects(&q))
                .map(|(k, _)| *k)
                .collect();
            assert_eq!(got, expected, "query {q:?} must match brute force");
            for (k, b) in &boxes {
                if q.contains(b) {
                    assert!(got.contains(k), "contained object {k:?} missing");
                }
            }
        }
    }

    #[test]
    fn handle_reuse_never_aliases() {
        let mut idx = SpatialIndex::new();
        let a_box = Aabb2D::from_xywh(0.0, 0.0, 10.0, 10.0);
        let b_box = Aabb2D::from_xywh(500.0, 500.0, 10.0, 10.0);
        let ha = idx.insert(id(1), a_box);
        idx.remove(id(1));
        let hb = idx.insert(id(2), b_box);
        assert_eq!(ha, hb, "freed handle is reused immediately");
        assert_eq!(idx.resolve(hb), Some(id(2)));
        assert_eq!(idx.bounds(hb), Some(b_box));
        assert!(idx.query_region(a_box).is_empty(), "A's old box must not resolve");
        assert_eq!(idx.query_region(b_box), vec![hb]);
    }

    #[test]
    fn leaves_split_then_merge_back() {
        let mut idx = SpatialIndex::new();
        let cap = idx.config().max_objects_per_node as u64;
        for n in 0..=cap * 4 {
            let x = (n % 8) as f64 * 100.0;
            let y = (n / 8) as f64 * 100.0;
            idx.insert(id(n), Aabb2D::from_xywh(x, y, 10.0, 10.0));
        }
        let grown = idx.stats();
        assert!(grown.nodes > 1, "overflowing root must split");
        assert!(grown.max_depth >= 1);
        assert_consistent(&idx);

        for n in 0..=cap * 4 {
            idx.remove(id(n));
            assert_consistent(&idx);
        }
        let shrunk = idx.stats();
        assert_eq!(shrunk.objects, 0);
        assert_eq!(shrunk.nodes, 1, "empty tree collapses back to a lone root");
    }

    #[test]
    fn max_depth_stops_splitting() {
        let mut idx = SpatialIndex::with_config(IndexConfig {
            max_depth: 3,
            ..IndexConfig::default()
        })
        .unwrap();
        // The anchor fixes the root around the origin; the stack sits well inside one quadrant.
        idx.insert(id(0), Aabb2D::from_xywh(0.0, 0.0, 1.0, 1.0));
        for n in 1..=64 {
            idx.insert(id(n), Aabb2D::from_xywh(300.0, 300.0, 0.5, 0.5));
        }
        assert_eq!(idx.stats().max_depth, 3);
        assert_eq!(idx.query_point(300.2, 300.2).len(), 64);
        assert_consistent(&idx);
    }

    #[test]
    fn small_moves_stay_large_jumps_reinsert() {
        let mut idx = SpatialIndex::new();
        for n in 0..40 {
            let x = (n % 10) as f64 * 200.0;
            let y = (n / 10) as f64 * 200.0;
            idx.insert(id(n), Aabb2D::from_xywh(x, y, 10.0, 10.0));
        }
        let before = idx.objects.get(idx.handle_of(id(5)).unwrap().0).unwrap().node;
        let nudged = Aabb2D::from_xywh(1001.0, 1.0, 10.0, 10.0);
        assert!(idx.update_bounds(id(5), nudged));
        let after = idx.objects.get(idx.handle_of(id(5)).unwrap().0).unwrap().node;
        assert_eq!(before, after, "nudge inside loose bounds keeps the node");

        let far = Aabb2D::from_xywh(50_000.0, 50_000.0, 10.0, 10.0);
        assert!(idx.update_bounds(id(5), far));
        assert_eq!(idx.query_region(far), vec![idx.handle_of(id(5)).unwrap()]);
        assert!(!idx.query_region(nudged).contains(&idx.handle_of(id(5)).unwrap()));
        assert_consistent(&idx);
    }

    #[test]
    fn root_grows_toward_far_objects() {
        let mut idx = SpatialIndex::new();
        for n in 0..20 {
            idx.insert(id(n), Aabb2D::from_xywh(n as f64 * 10.0, 0.0, 5.0, 5.0));
        }
        let far = Aabb2D::from_xywh(-1.0e6, 3.0e6, 5.0, 5.0);
        let h = idx.insert(id(99), far);
        assert_eq!(idx.query_region(far), vec![h]);
        assert_eq!(
            idx.query_region(Aabb2D::new(0.0, 0.0, 200.0, 5.0)).len(),
            20,
            "objects under the old root stay reachable"
        );
        assert_consistent(&idx);
    }

    #[test]
    fn churn_flags_dynamic_then_decays() {
        let mut idx = SpatialIndex::with_config(IndexConfig {
            churn_threshold: 2,
            churn_window: 8,
            ..IndexConfig::default()
        })
        .unwrap();
        let h = idx.insert(id(1), Aabb2D::from_xywh(0.0, 0.0, 10.0, 10.0));
        idx.insert(id(2), Aabb2D::from_xywh(100.0, 0.0, 10.0, 10.0));
        assert!(idx.flags(h).unwrap().contains(ObjectFlags::STATIC));

        for step in 1..=3 {
            idx.update_bounds(id(1), Aabb2D::from_xywh(step as f64, 0.0, 10.0, 10.0));
        }
        assert!(idx.flags(h).unwrap().contains(ObjectFlags::DYNAMIC));
        assert_eq!(idx.dynamic_handles().collect::<Vec<_>>(), vec![h]);

        // Two quiet windows elapse while another object moves.
        let advance = |idx: &mut SpatialIndex| {
            for step in 0..10 {
                idx.update_bounds(id(2), Aabb2D::from_xywh(100.0 + step as f64, 0.0, 10.0, 10.0));
            }
        };
        advance(&mut idx);
        idx.update_bounds(id(1), Aabb2D::from_xywh(0.0, 1.0, 10.0, 10.0));
        assert!(
            idx.flags(h).unwrap().contains(ObjectFlags::DYNAMIC),
            "the churny window itself keeps the object dynamic"
        );
        advance(&mut idx);
        idx.update_bounds(id(1), Aabb2D::from_xywh(0.0, 2.0, 10.0, 10.0));
        let flags = idx.flags(h).unwrap();
        assert!(flags.contains(ObjectFlags::STATIC));
        assert!(!flags.contains(ObjectFlags::DYNAMIC));
    }

    #[test]
    fn stale_references_are_purged_not_returned() {
        let mut idx = SpatialIndex::new();
        let b = Aabb2D::from_xywh(0.0, 0.0, 10.0, 10.0);
        let h = idx.insert(id(1), b);
        let keep = idx.insert(id(2), b);
        // Simulate a caller bug: the slot vanishes while its reference is still listed.
        let _ = idx.objects.release(h.0);
        idx.ids.remove(&id(1));
        assert_eq!(idx.query_region(b), vec![keep]);
        assert_eq!(idx.stats().references, 1, "stale reference released");
        assert_consistent(&idx);
    }

    #[test]
    fn bulk_load_skips_deleted_and_unbounded() {
        let mut objects = vec![
            ObjectDesc::new(1, ObjectKind::Stroke, Aabb2D::from_xywh(0.0, 0.0, 10.0, 10.0)),
            ObjectDesc::new(2, ObjectKind::Image, Aabb2D::from_xywh(5000.0, 0.0, 10.0, 10.0)),
            ObjectDesc::new(3, ObjectKind::Text, Aabb2D::from_xywh(0.0, 0.0, 1.0, 1.0)),
            ObjectDesc::new(4, ObjectKind::Shape, Aabb2D::from_xywh(0.0, 0.0, 1.0, 1.0)),
        ];
        objects[1].draw_order = Some(-5);
        objects[2].deleted = true;
        objects[3].bounds = None;

        let mut idx = SpatialIndex::new();
        idx.insert(id(77), Aabb2D::from_xywh(0.0, 0.0, 1.0, 1.0));
        assert_eq!(idx.bulk_load(&objects), 2);
        assert!(!idx.contains(id(77)), "bulk load replaces previous contents");
        assert!(!idx.contains(id(3)));
        assert!(!idx.contains(id(4)));
        assert_eq!(idx.get(id(2)).unwrap().draw_order, Some(-5));
        assert_consistent(&idx);
    }

    #[test]
    fn draw_order_sorts_explicit_then_sequence() {
        let mut idx = SpatialIndex::new();
        let b = Aabb2D::from_xywh(0.0, 0.0, 10.0, 10.0);
        let first = idx.insert(id(1), b);
        let second = idx.insert(id(2), b);
        let third = idx.insert(id(3), b);
        idx.set_draw_order(id(1), Some(10));
        let mut hits = idx.query_region(b);
        idx.sort_by_draw_order(&mut hits);
        assert_eq!(hits, vec![second, third, first]);
    }

    #[test]
    fn dirty_drain_reports_each_change_once() {
        let mut idx = SpatialIndex::new();
        idx.insert(id(1), Aabb2D::from_xywh(0.0, 0.0, 10.0, 10.0));
        idx.insert(id(2), Aabb2D::from_xywh(20.0, 0.0, 10.0, 10.0));
        let mut out = Vec::new();
        idx.drain_dirty(&mut out);
        assert_eq!(out, vec![id(1), id(2)]);
        idx.drain_dirty(&mut out);
        assert!(out.is_empty());

        idx.update_bounds(id(2), Aabb2D::from_xywh(21.0, 0.0, 10.0, 10.0));
        idx.update_bounds(id(2), Aabb2D::from_xywh(22.0, 0.0, 10.0, 10.0));
        idx.drain_dirty(&mut out);
        assert_eq!(out, vec![id(2)]);
    }

    #[test]
    fn dirty_drain_reports_removals() {
        let mut idx = SpatialIndex::new();
        for n in 1..=3 {
            idx.insert(id(n), Aabb2D::from_xywh(n as f64 * 20.0, 0.0, 10.0, 10.0));
        }
        let mut out = Vec::new();
        idx.drain_dirty(&mut out);

        assert!(idx.remove(id(3)));
        assert!(idx.remove(id(1)));
        assert!(!idx.remove(id(1)));
        idx.drain_dirty(&mut out);
        assert_eq!(out, vec![id(1), id(3)]);
        idx.drain_dirty(&mut out);
        assert!(out.is_empty());

        // Removed then inserted again before the drain: reported once, as live.
        idx.remove(id(2));
        idx.insert(id(2), Aabb2D::from_xywh(500.0, 0.0, 10.0, 10.0));
        idx.drain_dirty(&mut out);
        assert_eq!(out, vec![id(2)]);
        assert!(idx.contains(id(2)));
        assert_consistent(&idx);
    }
}
