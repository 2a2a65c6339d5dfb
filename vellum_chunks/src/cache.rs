// Copyright 2025 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chunk cache: segment membership, per-frame rebuild decisions, and surface ownership.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::fmt;

use kurbo::{Rect, Vec2};
use vellum_index::{ObjectId, SpatialIndex, SpatialObject};

use crate::config::{ChunkConfig, ConfigError};
use crate::grid::{ChunkCoord, ChunkRange, Segment, aabb_to_rect};
use crate::lod::{Detail, LodBand, LodSelector, Viewport};

/// How a visible chunk is presented this frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChunkMode {
    /// Objects are composited live at full detail.
    Live,
    /// A cached raster is composited.
    Raster,
}

impl ChunkMode {
    /// Mode used for chunks shown at `band`.
    pub fn for_band(band: LodBand) -> Self {
        if band.is_near() { Self::Live } else { Self::Raster }
    }
}

/// Result of asking a [`SegmentRenderer`] to draw one segment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DrawOutcome {
    /// The object was drawn.
    Drawn,
    /// The object no longer exists; the segment is dropped.
    Missing,
}

/// One draw request issued while rebuilding a chunk surface.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SegmentDraw {
    /// Object to draw.
    pub object: ObjectId,
    /// The object's world-space bounding box.
    pub object_bounds: Rect,
    /// Object origin relative to the chunk origin.
    pub offset: Vec2,
    /// Chunk-local clip, or `None` to draw the whole object.
    pub clip: Option<Rect>,
    /// Detail level to draw at.
    pub detail: Detail,
}

impl SegmentDraw {
    fn new(segment: &Segment, mode: ChunkMode) -> Self {
        let (clip, detail) = match mode {
            ChunkMode::Live => (None, Detail::Full),
            ChunkMode::Raster => (Some(segment.local_clip), segment.detail),
        };
        Self {
            object: segment.object,
            object_bounds: segment.object_bounds,
            offset: segment.offset,
            clip,
            detail,
        }
    }
}

/// Draws objects into chunk surfaces.
///
/// The cache decides when a surface must be rebuilt; the renderer owns what a surface is
/// (a display list, a texture, a scene fragment).
pub trait SegmentRenderer {
    /// Per-chunk drawing target.
    type Surface;

    /// Start rebuilding the surface of `chunk` for `mode`.
    ///
    /// `recycled` is the surface previously built for this chunk and mode, if any, so its
    /// storage can be reset and reused.
    fn begin(
        &mut self,
        chunk: ChunkCoord,
        bounds: Rect,
        mode: ChunkMode,
        recycled: Option<Self::Surface>,
    ) -> Self::Surface;

    /// Draw one segment into `surface`.
    fn draw(&mut self, surface: &mut Self::Surface, segment: &SegmentDraw) -> DrawOutcome;
}

/// A grid cell with its segments and cached surfaces.
pub struct Chunk<S> {
    coord: ChunkCoord,
    bounds: Rect,
    segments: Vec<Segment>,
    /// Membership changed since the surface for the current mode was built.
    dirty: bool,
    /// Membership changed since the surface for the other mode was built.
    content_changed: bool,
    prev_band: Option<LodBand>,
    live: Option<S>,
    raster: Option<S>,
    raster_band: Option<LodBand>,
}

impl<S> Chunk<S> {
    fn new(coord: ChunkCoord, size: f64) -> Self {
        Self {
            coord,
            bounds: coord.bounds(size),
            segments: Vec::new(),
            dirty: true,
            content_changed: true,
            prev_band: None,
            live: None,
            raster: None,
            raster_band: None,
        }
    }

    /// Grid coordinate.
    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// World-space bounds.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Segments in insertion order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether the surface for the current mode needs a rebuild.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether membership changed since the surface for the other mode was built.
    pub fn content_changed(&self) -> bool {
        self.content_changed
    }

    /// Band this chunk was last shown at.
    pub fn prev_band(&self) -> Option<LodBand> {
        self.prev_band
    }

    /// Band the cached raster was last built at.
    pub fn raster_band(&self) -> Option<LodBand> {
        self.raster_band
    }

    /// Surface built for `mode`, if any.
    pub fn surface(&self, mode: ChunkMode) -> Option<&S> {
        match mode {
            ChunkMode::Live => self.live.as_ref(),
            ChunkMode::Raster => self.raster.as_ref(),
        }
    }

    fn slot(&mut self, mode: ChunkMode) -> &mut Option<S> {
        match mode {
            ChunkMode::Live => &mut self.live,
            ChunkMode::Raster => &mut self.raster,
        }
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.content_changed = true;
    }

    fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
        self.touch();
    }

    fn remove_object(&mut self, id: ObjectId) -> bool {
        let before = self.segments.len();
        self.segments.retain(|s| s.object != id);
        let removed = self.segments.len() != before;
        if removed {
            self.touch();
        }
        removed
    }
}

impl<S> fmt::Debug for Chunk<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("coord", &self.coord)
            .field("bounds", &self.bounds)
            .field("segments", &self.segments.len())
            .field("dirty", &self.dirty)
            .field("content_changed", &self.content_changed)
            .field("prev_band", &self.prev_band)
            .field("live", &self.live.is_some())
            .field("raster", &self.raster.is_some())
            .field("raster_band", &self.raster_band)
            .finish()
    }
}

/// A visible chunk and the surface to composite for it this frame.
pub struct VisibleChunk<'a, S> {
    /// Grid coordinate.
    pub coord: ChunkCoord,
    /// World-space bounds.
    pub bounds: Rect,
    /// Live or raster.
    pub mode: ChunkMode,
    /// Surface to composite.
    pub surface: Option<&'a S>,
}

impl<S> fmt::Debug for VisibleChunk<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisibleChunk")
            .field("coord", &self.coord)
            .field("bounds", &self.bounds)
            .field("mode", &self.mode)
            .field("surface", &self.surface.is_some())
            .finish()
    }
}

/// Work done by one [`ChunkCache::update_visible`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Chunks intersecting the visible rectangle.
    pub visible: usize,
    /// Live surfaces rebuilt.
    pub live_rebuilds: usize,
    /// Raster surfaces rebuilt.
    pub raster_rebuilds: usize,
    /// Surfaces reused as-is.
    pub reused: usize,
    /// Segments dropped because their object was missing.
    pub dropped_segments: usize,
}

impl FrameStats {
    /// Total rebuilds of either kind.
    pub fn rebuilds(&self) -> usize {
        self.live_rebuilds + self.raster_rebuilds
    }
}

#[derive(Clone, Debug)]
struct ObjectEntry {
    bounds: Rect,
    chunks: Vec<ChunkCoord>,
}

/// Fixed-size chunk grid over the board with per-chunk cached surfaces.
///
/// Feed object boxes with [`ChunkCache::sync_objects`] (or [`ChunkCache::sync_from_index`]),
/// then call [`ChunkCache::update_visible`] once per frame and composite
/// [`ChunkCache::visible_chunks`].
///
/// Chunks are created the first time a box overlaps them and live until [`ChunkCache::clear`].
pub struct ChunkCache<S> {
    config: ChunkConfig,
    chunks: BTreeMap<ChunkCoord, Chunk<S>>,
    objects: BTreeMap<ObjectId, ObjectEntry>,
    visible: Vec<(ChunkCoord, ChunkMode)>,
    scratch: Vec<ChunkCoord>,
    dropped: Vec<ObjectId>,
}

impl<S> fmt::Debug for ChunkCache<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkCache")
            .field("config", &self.config)
            .field("chunks", &self.chunks.len())
            .field("objects", &self.objects.len())
            .field("visible", &self.visible.len())
            .finish_non_exhaustive()
    }
}

impl<S> Default for ChunkCache<S> {
    fn default() -> Self {
        Self::from_valid(ChunkConfig::default())
    }
}

impl<S> ChunkCache<S> {
    /// Create an empty cache with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache, rejecting invalid configurations.
    pub fn with_config(config: ChunkConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    fn from_valid(config: ChunkConfig) -> Self {
        Self {
            config,
            chunks: BTreeMap::new(),
            objects: BTreeMap::new(),
            visible: Vec::new(),
            scratch: Vec::new(),
            dropped: Vec::new(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// A fresh band selector using this cache's thresholds.
    pub fn lod_selector(&self) -> LodSelector {
        LodSelector::new(self.config.lod)
    }

    /// Number of chunks created so far.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of objects with at least one segment.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Total segments across all chunks.
    pub fn segment_count(&self) -> usize {
        self.chunks.values().map(|c| c.segments.len()).sum()
    }

    /// Look up a chunk.
    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Chunk<S>> {
        self.chunks.get(&coord)
    }

    /// Chunks holding a segment of `id`.
    pub fn chunks_of(&self, id: ObjectId) -> &[ChunkCoord] {
        self.objects.get(&id).map_or(&[], |e| e.chunks.as_slice())
    }

    /// Every segment of `id` with its chunk.
    pub fn segments_for(&self, id: ObjectId) -> impl Iterator<Item = (ChunkCoord, &Segment)> + '_ {
        self.chunks_of(id)
            .iter()
            .filter_map(move |coord| self.chunks.get(coord))
            .flat_map(move |chunk| {
                chunk
                    .segments
                    .iter()
                    .filter(move |s| s.object == id)
                    .map(move |s| (chunk.coord, s))
            })
    }

    /// Bring segment membership up to date with `objects`.
    ///
    /// Returns how many objects changed membership.
    pub fn sync_objects<O: SpatialObject>(&mut self, objects: &[O]) -> usize {
        let mut changed = 0;
        for object in objects {
            if self.sync_object(object) {
                changed += 1;
            }
        }
        changed
    }

    /// Bring one object's segments up to date.
    ///
    /// Deleted objects are removed. Objects without a box are skipped. Returns whether
    /// membership changed.
    pub fn sync_object<O: SpatialObject + ?Sized>(&mut self, object: &O) -> bool {
        let id = object.id();
        if object.is_deleted() {
            return self.remove_object(id);
        }
        let Some(bounds) = object.bounds() else {
            log::debug!("skipping {id:?}: no bounding box");
            return false;
        };
        self.sync_bounds(id, aabb_to_rect(bounds))
    }

    /// Place `id` at `bounds`, replacing any previous segments.
    ///
    /// Unchanged bounds are a no-op. Returns whether membership changed.
    pub fn sync_bounds(&mut self, id: ObjectId, bounds: Rect) -> bool {
        if !bounds.is_finite() {
            log::debug!("skipping {id:?}: non-finite bounds {bounds:?}");
            return false;
        }
        if let Some(entry) = self.objects.get(&id)
            && entry.bounds == bounds
        {
            return false;
        }
        let mut coords = match self.objects.remove(&id) {
            Some(entry) => {
                self.detach(id, &entry.chunks);
                entry.chunks
            }
            None => Vec::new(),
        };
        coords.clear();
        let size = self.config.chunk_size;
        for coord in ChunkRange::covering(bounds, size).iter() {
            self.chunks
                .entry(coord)
                .or_insert_with(|| Chunk::new(coord, size))
                .push(Segment::new(id, bounds, coord, size));
            coords.push(coord);
        }
        self.objects.insert(
            id,
            ObjectEntry {
                bounds,
                chunks: coords,
            },
        );
        true
    }

    /// Resynchronise `ids` from the index.
    ///
    /// Pair with [`SpatialIndex::drain_dirty`]. Ids the index no longer holds are removed.
    /// Returns how many objects changed membership.
    pub fn sync_from_index(&mut self, index: &SpatialIndex, ids: &[ObjectId]) -> usize {
        let mut changed = 0;
        for &id in ids {
            let hit = match index.get(id) {
                Some(view) => self.sync_bounds(id, aabb_to_rect(view.bounds)),
                None => self.remove_object(id),
            };
            if hit {
                changed += 1;
            }
        }
        changed
    }

    /// Remove every segment of `id`. Returns whether it had any.
    pub fn remove_object(&mut self, id: ObjectId) -> bool {
        let Some(entry) = self.objects.remove(&id) else {
            return false;
        };
        self.detach(id, &entry.chunks);
        true
    }

    /// Force the chunks holding `id` to rebuild, for changes that keep its box.
    pub fn invalidate_object(&mut self, id: ObjectId) -> bool {
        let Some(entry) = self.objects.get(&id) else {
            return false;
        };
        for coord in &entry.chunks {
            if let Some(chunk) = self.chunks.get_mut(coord) {
                chunk.touch();
            }
        }
        true
    }

    /// Force every chunk to rebuild.
    pub fn invalidate_all(&mut self) {
        for chunk in self.chunks.values_mut() {
            chunk.touch();
        }
    }

    /// Drop all chunks, segments, and surfaces.
    pub fn clear(&mut self) {
        log::debug!(
            "clearing chunk cache: {} chunks, {} objects",
            self.chunks.len(),
            self.objects.len()
        );
        self.chunks.clear();
        self.objects.clear();
        self.visible.clear();
    }

    fn detach(&mut self, id: ObjectId, coords: &[ChunkCoord]) {
        for coord in coords {
            if let Some(chunk) = self.chunks.get_mut(coord) {
                chunk.remove_object(id);
            }
        }
    }

    /// Decide and perform this frame's work for every chunk intersecting `visible`.
    ///
    /// At [`LodBand::Near`] chunks use their live surface; at coarser bands their raster.
    /// A surface is rebuilt only when membership changed since it was built or it does not
    /// exist yet, so repeated frames over an unchanged board rebuild nothing, and switching
    /// across the near threshold reuses both surfaces. A raster is also rebuilt when the
    /// coarse band differs from the one it was drawn at. Segment detail is recomputed every
    /// frame.
    pub fn update_visible<R>(
        &mut self,
        viewport: &Viewport,
        visible: Rect,
        renderer: &mut R,
    ) -> FrameStats
    where
        R: SegmentRenderer<Surface = S>,
    {
        let mut stats = FrameStats::default();
        let band = viewport.band;
        let mode = ChunkMode::for_band(band);
        let thresholds = self.config.detail;

        self.collect_visible(ChunkRange::covering(visible, self.config.chunk_size));
        self.visible.clear();
        let coords = core::mem::take(&mut self.scratch);
        for &coord in &coords {
            let Some(chunk) = self.chunks.get_mut(&coord) else {
                continue;
            };
            stats.visible += 1;
            // Crossing between live and raster: the target surface is stale exactly when
            // membership changed after it was last built.
            if let Some(prev) = chunk.prev_band
                && ChunkMode::for_band(prev) != mode
            {
                core::mem::swap(&mut chunk.dirty, &mut chunk.content_changed);
            }
            chunk.prev_band = Some(band);
            for segment in &mut chunk.segments {
                segment.detail = thresholds.detail_for_bounds(segment.object_bounds, viewport.scale);
            }

            let stale_band = mode == ChunkMode::Raster && chunk.raster_band != Some(band);
            if chunk.dirty || stale_band || chunk.surface(mode).is_none() {
                self.dropped.clear();
                rebuild(chunk, mode, renderer, &mut self.dropped);
                match mode {
                    ChunkMode::Live => stats.live_rebuilds += 1,
                    ChunkMode::Raster => {
                        chunk.raster_band = Some(band);
                        stats.raster_rebuilds += 1;
                    }
                }
                stats.dropped_segments += self.dropped.len();
                for id in self.dropped.drain(..) {
                    if let Some(entry) = self.objects.get_mut(&id) {
                        entry.chunks.retain(|c| *c != coord);
                        if entry.chunks.is_empty() {
                            self.objects.remove(&id);
                        }
                    }
                }
            } else {
                stats.reused += 1;
            }
            self.visible.push((coord, mode));
        }
        self.scratch = coords;
        stats
    }

    /// Chunks handled by the last [`ChunkCache::update_visible`], in grid order.
    pub fn visible_chunks(&self) -> impl Iterator<Item = VisibleChunk<'_, S>> + '_ {
        self.visible.iter().filter_map(move |&(coord, mode)| {
            let chunk = self.chunks.get(&coord)?;
            Some(VisibleChunk {
                coord,
                bounds: chunk.bounds,
                mode,
                surface: chunk.surface(mode),
            })
        })
    }

    /// Fill `scratch` with existing chunks inside `range`, in grid order.
    fn collect_visible(&mut self, range: ChunkRange) {
        self.scratch.clear();
        if range.len() > u64::try_from(self.chunks.len()).unwrap_or(u64::MAX) {
            self.scratch.extend(
                self.chunks
                    .keys()
                    .copied()
                    .filter(|coord| range.contains(*coord)),
            );
        } else {
            for x in range.min_x..=range.max_x {
                let lo = ChunkCoord::new(x, range.min_y);
                let hi = ChunkCoord::new(x, range.max_y);
                self.scratch
                    .extend(self.chunks.range(lo..=hi).map(|(coord, _)| *coord));
            }
        }
    }
}

fn rebuild<R: SegmentRenderer>(
    chunk: &mut Chunk<R::Surface>,
    mode: ChunkMode,
    renderer: &mut R,
    dropped: &mut Vec<ObjectId>,
) {
    let recycled = chunk.slot(mode).take();
    let mut surface = renderer.begin(chunk.coord, chunk.bounds, mode, recycled);
    chunk.segments.retain(|segment| {
        match renderer.draw(&mut surface, &SegmentDraw::new(segment, mode)) {
            DrawOutcome::Drawn => true,
            DrawOutcome::Missing => {
                dropped.push(segment.object);
                false
            }
        }
    });
    *chunk.slot(mode) = Some(surface);
    chunk.dirty = false;
    if !dropped.is_empty() {
        // The other surface still shows the dropped objects.
        chunk.content_changed = true;
        log::debug!(
            "chunk ({}, {}): dropped {} segments of missing objects",
            chunk.coord.x,
            chunk.coord.y,
            dropped.len()
        );
    }
    log::trace!(
        "rebuilt {mode:?} surface for chunk ({}, {}) with {} segments",
        chunk.coord.x,
        chunk.coord.y,
        chunk.segments.len()
    );
}
