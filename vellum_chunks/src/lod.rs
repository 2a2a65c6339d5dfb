// Copyright 2025 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Level-of-detail bands, per-object detail levels, and the per-frame viewport.

use kurbo::{Point, Rect, Vec2};

use crate::config::ConfigError;

/// Zoom band of the whole viewport, ordered nearest to coarsest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LodBand {
    /// Closest zoom; chunks render live at full detail.
    Near,
    /// Medium zoom.
    Mid,
    /// Far zoom.
    Far,
    /// Whole-board overview.
    Overview,
}

impl LodBand {
    /// Whether this is the nearest band.
    #[inline]
    pub fn is_near(self) -> bool {
        self == Self::Near
    }
}

/// Simplification level for drawing a single object, chosen from its on-screen size.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Detail {
    /// Every point, full styling.
    Full,
    /// Simplified geometry.
    Medium,
    /// Coarse geometry.
    Low,
    /// A placeholder mark.
    Overview,
}

/// On-screen diagonal sizes (in pixels) at which objects switch detail.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetailThresholds {
    /// Minimum diagonal for [`Detail::Full`].
    pub full: f64,
    /// Minimum diagonal for [`Detail::Medium`].
    pub medium: f64,
    /// Minimum diagonal for [`Detail::Low`]. Anything smaller is [`Detail::Overview`].
    pub low: f64,
}

impl Default for DetailThresholds {
    fn default() -> Self {
        Self {
            full: 96.0,
            medium: 24.0,
            low: 6.0,
        }
    }
}

impl DetailThresholds {
    /// Detail for an object whose on-screen diagonal is `diagonal_px`.
    pub fn detail_for(&self, diagonal_px: f64) -> Detail {
        if diagonal_px >= self.full {
            Detail::Full
        } else if diagonal_px >= self.medium {
            Detail::Medium
        } else if diagonal_px >= self.low {
            Detail::Low
        } else {
            Detail::Overview
        }
    }

    /// Detail for a world-space box drawn at `scale`.
    pub fn detail_for_bounds(&self, bounds: Rect, scale: f64) -> Detail {
        let diagonal = Vec2::new(bounds.width(), bounds.height()).hypot();
        self.detail_for(diagonal * scale)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.full > self.medium && self.medium > self.low && self.low >= 0.0 {
            Ok(())
        } else {
            Err(ConfigError::DetailOrder)
        }
    }
}

/// Scale thresholds for [`LodBand`] selection, with hysteresis margins.
///
/// The literal values are tuning, not contract; adjust them against frame timing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodConfig {
    /// Minimum scale for [`LodBand::Near`].
    pub near: f64,
    /// Minimum scale for [`LodBand::Mid`].
    pub mid: f64,
    /// Minimum scale for [`LodBand::Far`]. Anything smaller is [`LodBand::Overview`].
    pub far: f64,
    /// Fraction past a threshold the scale must travel before entering a finer band.
    pub enter_margin: f64,
    /// Fraction below a threshold the scale must travel before leaving for a coarser band.
    pub exit_margin: f64,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            near: 0.5,
            mid: 0.2,
            far: 0.05,
            enter_margin: 0.1,
            exit_margin: 0.1,
        }
    }
}

impl LodConfig {
    /// Band for `scale` without hysteresis.
    pub fn band_for_scale(&self, scale: f64) -> LodBand {
        if scale >= self.near {
            LodBand::Near
        } else if scale >= self.mid {
            LodBand::Mid
        } else if scale >= self.far {
            LodBand::Far
        } else {
            LodBand::Overview
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !(self.near > self.mid && self.mid > self.far && self.far > 0.0) {
            return Err(ConfigError::LodOrder);
        }
        for margin in [self.enter_margin, self.exit_margin] {
            if !(0.0..1.0).contains(&margin) {
                return Err(ConfigError::Margin(margin));
            }
        }
        Ok(())
    }
}

/// Band selector that resists flicker when the scale hovers near a threshold.
#[derive(Clone, Debug)]
pub struct LodSelector {
    config: LodConfig,
    current: Option<LodBand>,
}

impl LodSelector {
    /// Create a selector with no band chosen yet.
    pub fn new(config: LodConfig) -> Self {
        Self {
            config,
            current: None,
        }
    }

    /// Band chosen by the last [`LodSelector::select`] call.
    pub fn current(&self) -> Option<LodBand> {
        self.current
    }

    /// Choose the band for `scale`.
    ///
    /// The first call picks the raw band. Afterwards, moving to a finer band requires the
    /// scale to clear the threshold by `enter_margin`; moving to a coarser band requires it
    /// to fall below the threshold by `exit_margin`.
    pub fn select(&mut self, scale: f64) -> LodBand {
        let raw = self.config.band_for_scale(scale);
        let next = match self.current {
            None => raw,
            Some(current) if raw == current => current,
            Some(current) if raw < current => {
                // Zooming in: judge as if the scale were smaller.
                let damped = self
                    .config
                    .band_for_scale(scale / (1.0 + self.config.enter_margin));
                damped.min(current)
            }
            Some(current) => {
                // Zooming out: judge as if the scale were larger.
                let damped = self
                    .config
                    .band_for_scale(scale / (1.0 - self.config.exit_margin));
                damped.max(current)
            }
        };
        if self.current != Some(next) {
            log::trace!("lod band {:?} -> {:?} at scale {scale}", self.current, next);
        }
        self.current = Some(next);
        next
    }
}

/// Per-frame view onto the board.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    /// Screen pixels per world unit.
    pub scale: f64,
    /// Screen-space position of the world origin.
    pub pan: Vec2,
    /// Screen width in pixels.
    pub width: f64,
    /// Screen height in pixels.
    pub height: f64,
    /// Zoom band for this frame.
    pub band: LodBand,
}

impl Viewport {
    /// Create a viewport.
    pub const fn new(scale: f64, pan: Vec2, width: f64, height: f64, band: LodBand) -> Self {
        Self {
            scale,
            pan,
            width,
            height,
            band,
        }
    }

    /// Map a screen point to world space.
    pub fn screen_to_world(&self, p: Point) -> Point {
        ((p.to_vec2() - self.pan) / self.scale).to_point()
    }

    /// World-space rectangle covered by the screen.
    pub fn world_rect(&self) -> Rect {
        Rect::from_points(
            self.screen_to_world(Point::ZERO),
            self.screen_to_world(Point::new(self.width, self.height)),
        )
    }
}
