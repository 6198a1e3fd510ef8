// SPDX-License-Identifier: MIT
//! # Scaling Plans
//!
//! This module computes output dimensions for a resample before any pixel is
//! touched. A plan is a pure function of the input size and the bounding box,
//! so the same inputs always give the same output dimensions regardless of
//! which resampler later executes the plan.
//!
//! A plan fits the input inside a bounding box with its aspect ratio kept,
//! shrinking or enlarging as needed, and records whether that is a downscale,
//! an upscale or no change at all.
//!
//! All computations use f64 and round to integers, clamped to at least 1px.

/// Represents a 2D size with width and height in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub w: u32,
    pub h: u32,
}

impl Size {
    pub const fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    /// True when either side is zero.
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Width divided by height. Returns 0.0 for empty sizes.
    pub fn aspect_ratio(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            f64::from(self.w) / f64::from(self.h)
        }
    }

    /// Byte length of a tightly packed RGBA8 buffer of this size.
    pub fn rgba_len(&self) -> usize {
        (self.w as usize) * (self.h as usize) * 4
    }
}

/// Whether a plan shrinks, enlarges or keeps the input size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScaleDirection {
    /// At least one axis shrinks.
    Down,
    /// No axis shrinks and at least one grows (scale factor > 1).
    Up,
    /// Output equals input; no resampling required.
    Identity,
}

impl ScaleDirection {
    /// True for scale factors >= 1, where wide downscale kernels must not be used.
    pub fn is_enlarging_or_identity(self) -> bool {
        !matches!(self, ScaleDirection::Down)
    }
}

/// Complete scaling plan computed from input parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScalePlan {
    /// Original input dimensions
    pub input: Size,
    /// Bounding box the output fits in
    pub bounds: Size,
    /// Final computed output dimensions
    pub out: Size,
}

impl ScalePlan {
    /// Classify the plan by comparing output and input per axis.
    pub fn direction(&self) -> ScaleDirection {
        if self.out == self.input {
            ScaleDirection::Identity
        } else if self.out.w < self.input.w || self.out.h < self.input.h {
            ScaleDirection::Down
        } else {
            ScaleDirection::Up
        }
    }
}

/// Fit `input` inside `bounds` keeping its aspect ratio.
///
/// The constrained axis touches the box edge. Empty inputs produce an empty
/// plan; callers are expected to reject them before planning.
pub fn build_plan(input: Size, bounds: Size) -> ScalePlan {
    let out = if input.is_empty() {
        Size::default()
    } else {
        fit_within(input, bounds)
    };
    ScalePlan { input, bounds, out }
}

fn fit_within(input: Size, bounds: Size) -> Size {
    let (w, h) = (f64::from(input.w), f64::from(input.h));
    let s = (f64::from(bounds.w) / w).min(f64::from(bounds.h) / h);
    let mut out = Size::new(((w * s).round() as u32).max(1), ((h * s).round() as u32).max(1));
    // Snap the constrained axis to the box edge so rounding never overshoots.
    if bounds.w > 0 && out.w > bounds.w {
        out.w = bounds.w;
    }
    if bounds.h > 0 && out.h > bounds.h {
        out.h = bounds.h;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_shrinks_to_touch_the_box() {
        let plan = build_plan(Size::new(1600, 2400), Size::new(800, 800));
        assert_eq!(plan.out, Size::new(533, 800));
        assert_eq!(plan.direction(), ScaleDirection::Down);
    }

    #[test]
    fn fit_enlarges_small_pages() {
        let plan = build_plan(Size::new(400, 600), Size::new(1000, 1200));
        assert_eq!(plan.out, Size::new(800, 1200));
        assert_eq!(plan.direction(), ScaleDirection::Up);
        assert!(plan.direction().is_enlarging_or_identity());
    }

    #[test]
    fn exact_fit_is_identity() {
        let plan = build_plan(Size::new(400, 600), Size::new(900, 600));
        assert_eq!(plan.out, Size::new(400, 600));
        assert_eq!(plan.direction(), ScaleDirection::Identity);
    }

    #[test]
    fn tall_page_in_square_box_is_height_bound() {
        let plan = build_plan(Size::new(60, 120), Size::new(100, 100));
        assert_eq!(plan.out, Size::new(50, 100));
        assert_eq!(plan.direction(), ScaleDirection::Down);
    }

    #[test]
    fn empty_input_yields_empty_plan() {
        let plan = build_plan(Size::new(0, 10), Size::new(90, 90));
        assert!(plan.out.is_empty());
    }
}
