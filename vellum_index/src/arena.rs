// Copyright 2025 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Growable slot arena with an index free list.
//!
//! Object records, quadtree nodes, and object references all live in arenas.
//! Released slots go onto a free list and are handed out again before the
//! backing buffer grows, so steady-state churn does not allocate.

use alloc::vec::Vec;
use core::fmt::Debug;

/// Slot arena addressed by dense `u32` indices.
pub struct Arena<T> {
    name: &'static str,
    slots: Vec<Option<T>>,
    free_list: Vec<u32>,
    live: usize,
}

impl<T> Arena<T> {
    /// Create an arena with room for `capacity` slots before the first growth.
    pub fn with_capacity(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            live: 0,
        }
    }

    /// Store `value`, reusing a released slot when one is available.
    pub fn alloc(&mut self, value: T) -> u32 {
        self.live += 1;
        if let Some(idx) = self.free_list.pop() {
            self.slots[idx as usize] = Some(value);
            return idx;
        }
        if self.slots.len() == self.slots.capacity() {
            self.grow();
        }
        self.slots.push(Some(value));
        #[allow(
            clippy::cast_possible_truncation,
            reason = "Arena indices are 32-bit; more than u32::MAX slots is unsupported."
        )]
        let idx = (self.slots.len() - 1) as u32;
        idx
    }

    /// Release a slot, returning its value. Releasing a free slot is a no-op.
    pub fn release(&mut self, idx: u32) -> Option<T> {
        let value = self.slots.get_mut(idx as usize)?.take()?;
        self.free_list.push(idx);
        self.live -= 1;
        Some(value)
    }

    /// Access a live slot.
    #[inline]
    pub fn get(&self, idx: u32) -> Option<&T> {
        self.slots.get(idx as usize)?.as_ref()
    }

    /// Access a live slot mutably.
    #[inline]
    pub fn get_mut(&mut self, idx: u32) -> Option<&mut T> {
        self.slots.get_mut(idx as usize)?.as_mut()
    }

    /// Whether `idx` names a live slot.
    #[inline]
    pub fn is_live(&self, idx: u32) -> bool {
        self.get(idx).is_some()
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.live
    }

    /// True if no slot is live.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Slots available before the backing buffer must grow.
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Ensure room for `additional` more live slots without further growth.
    pub fn reserve(&mut self, additional: usize) {
        let reusable = self.free_list.len();
        if additional > reusable {
            self.slots.reserve(additional - reusable);
        }
    }

    /// Drop every slot, keeping the allocation.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_list.clear();
        self.live = 0;
    }

    /// Iterate live slots with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            #[allow(
                clippy::cast_possible_truncation,
                reason = "Arena indices are 32-bit by construction."
            )]
            s.as_ref().map(|v| (i as u32, v))
        })
    }

    fn grow(&mut self) {
        let old = self.slots.capacity();
        let additional = old.max(16);
        self.slots.reserve_exact(additional);
        log::debug!(
            "{} arena grew from {} to {} slots",
            self.name,
            old,
            self.slots.capacity()
        );
    }
}

impl<T> Debug for Arena<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Arena")
            .field("name", &self.name)
            .field("live", &self.live)
            .field("total_slots", &self.slots.len())
            .field("free", &self.free_list.len())
            .finish_non_exhaustive()
    }
}
