// Copyright 2025 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tuning knobs for the chunk cache.

use crate::lod::{DetailThresholds, LodConfig};

/// Configuration for a [`ChunkCache`](crate::ChunkCache).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkConfig {
    /// Side length of a grid chunk in world units.
    pub chunk_size: f64,
    /// On-screen sizes at which segments change detail.
    pub detail: DetailThresholds,
    /// Scale thresholds used by [`LodSelector`](crate::LodSelector).
    pub lod: LodConfig,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024.0,
            detail: DetailThresholds::default(),
            lod: LodConfig::default(),
        }
    }
}

impl ChunkConfig {
    /// Default configuration with a different chunk size.
    pub fn with_chunk_size(chunk_size: f64) -> Self {
        Self {
            chunk_size,
            ..Self::default()
        }
    }

    /// Check every threshold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.chunk_size.is_finite() && self.chunk_size > 0.0) {
            return Err(ConfigError::ChunkSize(self.chunk_size));
        }
        self.detail.validate()?;
        self.lod.validate()
    }
}

/// Rejected [`ChunkConfig`].
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The chunk size must be finite and positive.
    #[error("chunk size must be finite and positive, got {0}")]
    ChunkSize(f64),
    /// Detail thresholds must strictly decrease from `full` to `low`.
    #[error("detail thresholds must satisfy full > medium > low >= 0")]
    DetailOrder,
    /// Band thresholds must strictly decrease from `near` to `far`.
    #[error("lod thresholds must satisfy near > mid > far > 0")]
    LodOrder,
    /// Hysteresis margins are fractions in `[0, 1)`.
    #[error("hysteresis margin must lie in [0, 1), got {0}")]
    Margin(f64),
}
