// Copyright 2025 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tuning knobs for the spatial index.

/// Configuration for a [`SpatialIndex`](crate::SpatialIndex).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndexConfig {
    /// Factor (> 1.0) by which node bounds are inflated for membership and queries.
    ///
    /// Larger values mean fewer re-insertions on small movements and more
    /// candidate nodes visited per query.
    pub looseness: f64,
    /// References a leaf may hold before it splits.
    pub max_objects_per_node: u32,
    /// Depth at which leaves stop splitting.
    pub max_depth: u16,
    /// Sibling leaves holding fewer than this many references combined collapse into their parent.
    pub merge_threshold: u32,
    /// Bounds changes within one window after which an object is classified dynamic.
    pub churn_threshold: u32,
    /// Length of the churn window, counted in index-wide bounds updates.
    pub churn_window: u32,
    /// Object slots reserved up front.
    pub initial_capacity: usize,
    /// Smallest half extent of a freshly created root cell.
    pub min_root_half_extent: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            looseness: 1.5,
            max_objects_per_node: 8,
            max_depth: 16,
            merge_threshold: 4,
            churn_threshold: 4,
            churn_window: 32,
            initial_capacity: 256,
            min_root_half_extent: 1024.0,
        }
    }
}

impl IndexConfig {
    /// Check that the configuration describes a usable tree.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.looseness.is_finite() && self.looseness > 1.0) {
            return Err(ConfigError::Looseness(self.looseness));
        }
        if self.max_objects_per_node == 0 {
            return Err(ConfigError::NodeCapacity);
        }
        if self.merge_threshold > self.max_objects_per_node {
            return Err(ConfigError::MergeThreshold {
                merge: self.merge_threshold,
                capacity: self.max_objects_per_node,
            });
        }
        if self.churn_window == 0 {
            return Err(ConfigError::ChurnWindow);
        }
        if !(self.min_root_half_extent.is_finite() && self.min_root_half_extent > 0.0) {
            return Err(ConfigError::RootExtent(self.min_root_half_extent));
        }
        Ok(())
    }
}

/// Rejected [`IndexConfig`].
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Looseness must be finite and strictly greater than one.
    #[error("looseness must be finite and greater than 1.0, got {0}")]
    Looseness(f64),
    /// Leaves must be able to hold at least one reference.
    #[error("max objects per node must be at least 1")]
    NodeCapacity,
    /// Merging must not produce an overflowing leaf.
    #[error("merge threshold {merge} exceeds node capacity {capacity}")]
    MergeThreshold {
        /// Configured merge threshold.
        merge: u32,
        /// Configured node capacity.
        capacity: u32,
    },
    /// The churn window must span at least one update.
    #[error("churn window must span at least one update")]
    ChurnWindow,
    /// The root extent must be finite and positive.
    #[error("root half extent must be finite and positive, got {0}")]
    RootExtent(f64),
}
