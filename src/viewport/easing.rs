//! Exponential smoothing toward a target transform.
//!
//! The engine produces the target; this layer only interpolates between
//! transforms it is given, so it never touches the clamping rules. The caller
//! drives it with explicit time steps, usually once per rendered frame.

use std::time::Duration;

use super::zoom::{Vec2, ZoomTransform};

/// Differences below this snap to the target.
const SETTLE_EPSILON: f64 = 1e-3;

#[derive(Clone, Debug)]
pub struct ZoomEasing {
    current: ZoomTransform,
    target: ZoomTransform,
    /// Fraction of the remaining distance covered per second, as a rate constant.
    rate: f64,
}

impl ZoomEasing {
    pub fn new(initial: ZoomTransform, rate: f64) -> Self {
        Self {
            current: initial,
            target: initial,
            rate: rate.max(0.0),
        }
    }

    pub fn set_target(&mut self, target: ZoomTransform) {
        // Sizes are not animated.
        self.current.container_size = target.container_size;
        self.current.content_size = target.content_size;
        self.target = target;
    }

    /// Jump straight to the target.
    pub fn snap(&mut self) {
        self.current = self.target;
    }

    pub fn current(&self) -> ZoomTransform {
        self.current
    }

    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }

    /// Advance by `dt` and return the transform to render.
    pub fn step(&mut self, dt: Duration) -> ZoomTransform {
        let alpha = 1.0 - (-self.rate * dt.as_secs_f64()).exp();
        let lerp = |a: f64, b: f64| a + (b - a) * alpha;
        self.current.scale = lerp(self.current.scale, self.target.scale);
        self.current.offset = Vec2::new(
            lerp(self.current.offset.x, self.target.offset.x),
            lerp(self.current.offset.y, self.target.offset.y),
        );
        let close = (self.current.scale - self.target.scale).abs() < SETTLE_EPSILON
            && (self.current.offset.x - self.target.offset.x).abs() < SETTLE_EPSILON
            && (self.current.offset.y - self.target.offset.y).abs() < SETTLE_EPSILON;
        if close {
            self.current = self.target;
        }
        self.current
    }
}
