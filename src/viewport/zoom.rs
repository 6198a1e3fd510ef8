//! # Zoom/Pan Engine
//!
//! A single [`ZoomTransform`] mutated by gesture intake, one call at a time in
//! arrival order. Every transition is a synchronous function of the current
//! state and its input; there are no timers here (see [`super::easing`] for
//! optional smoothing).
//!
//! ## Coordinates
//!
//! - Content is laid out to `content_size` at scale 1, centered in the
//!   container.
//! - `offset` is the translation of the content center from the container
//!   center, in container pixels.
//! - Focal points are relative to the container center. Use
//!   [`ViewportEngine::add_zoom_at`] for absolute container coordinates.
//!
//! ## Bounds
//!
//! Per axis, with `scaled = content * scale`:
//!
//! - `scaled >= container`: the content may pan until an edge meets the
//!   container edge, `|offset| <= (scaled - container) / 2`
//! - otherwise at least `min_visible_fraction` of the content stays inside,
//!   `|offset| <= (container - scaled) / 2 + (1 - fraction) * scaled`

use std::ops::{Add, Mul, Sub};

use tokio::sync::watch;
use tracing::trace;

use crate::config::ViewportConfig;
use crate::error::ZoomError;

/// 2D vector in container pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// Current viewport state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomTransform {
    pub scale: f64,
    pub offset: Vec2,
    pub container_size: Vec2,
    pub content_size: Vec2,
}

impl ZoomTransform {
    /// Scale 1, centered.
    pub fn identity(container_size: Vec2, content_size: Vec2) -> Self {
        Self {
            scale: 1.0,
            offset: Vec2::ZERO,
            container_size,
            content_size,
        }
    }

    /// Content size on screen at the current scale.
    pub fn scaled_content(&self) -> Vec2 {
        self.content_size * self.scale
    }

    /// Largest allowed |offset| per axis.
    pub fn pan_bounds(&self, min_visible_fraction: f64) -> Vec2 {
        let scaled = self.scaled_content();
        Vec2::new(
            axis_bound(self.container_size.x, scaled.x, min_visible_fraction),
            axis_bound(self.container_size.y, scaled.y, min_visible_fraction),
        )
    }

    /// Fraction of the content inside the container, per axis.
    pub fn visible_fraction(&self) -> Vec2 {
        let scaled = self.scaled_content();
        Vec2::new(
            axis_visible(self.container_size.x, scaled.x, self.offset.x),
            axis_visible(self.container_size.y, scaled.y, self.offset.y),
        )
    }
}

fn axis_bound(container: f64, scaled: f64, fraction: f64) -> f64 {
    if !(container > 0.0 && scaled > 0.0) {
        return 0.0;
    }
    if scaled >= container {
        (scaled - container) / 2.0
    } else {
        (container - scaled) / 2.0 + (1.0 - fraction) * scaled
    }
}

fn axis_visible(container: f64, scaled: f64, offset: f64) -> f64 {
    if scaled <= 0.0 {
        return 1.0;
    }
    let lo = (offset - scaled / 2.0).max(-container / 2.0);
    let hi = (offset + scaled / 2.0).min(container / 2.0);
    ((hi - lo).max(0.0) / scaled).min(1.0)
}

/// Owns one reader session's transform and publishes every change.
#[derive(Debug)]
pub struct ViewportEngine {
    min_scale: f64,
    max_scale: f64,
    min_visible_fraction: f64,
    scroll_zoom_base: f64,
    scroll_pan_step: f64,
    transform: ZoomTransform,
    publisher: watch::Sender<ZoomTransform>,
}

/// Sizes must be finite and not negative; zero is allowed before layout.
fn check_size(what: &str, size: Vec2) -> Result<(), ZoomError> {
    if size.is_finite() && size.x >= 0.0 && size.y >= 0.0 {
        Ok(())
    } else {
        Err(ZoomError::InvalidInput(format!("{what} {size:?} must be finite and not negative")))
    }
}

impl ViewportEngine {
    /// Build an engine at scale 1, centered.
    ///
    /// Fails if `config` does not validate or either size is not finite or
    /// is negative.
    pub fn new(config: &ViewportConfig, container_size: Vec2, content_size: Vec2) -> Result<Self, ZoomError> {
        config.validate()?;
        check_size("container size", container_size)?;
        check_size("content size", content_size)?;
        let mut engine = Self::with_validated_config(config);
        engine.transform = ZoomTransform::identity(container_size, content_size);
        engine.publish();
        Ok(engine)
    }

    /// Engine with both sizes zero. `config` must already have passed
    /// [`ViewportConfig::validate`].
    pub(crate) fn with_validated_config(config: &ViewportConfig) -> Self {
        let transform = ZoomTransform::identity(Vec2::ZERO, Vec2::ZERO);
        let (publisher, _) = watch::channel(transform);
        Self {
            min_scale: config.min_scale,
            max_scale: config.max_scale,
            min_visible_fraction: config.min_visible_fraction,
            scroll_zoom_base: config.scroll_zoom_base,
            scroll_pan_step: config.scroll_pan_step,
            transform,
            publisher,
        }
    }

    pub fn transform(&self) -> ZoomTransform {
        self.transform
    }

    /// Read-only view of the transform; updated after every transition.
    pub fn subscribe(&self) -> watch::Receiver<ZoomTransform> {
        self.publisher.subscribe()
    }

    /// Zoom by `factor` keeping the content point under `focal` stationary.
    ///
    /// `focal` is relative to the container center.
    pub fn add_zoom(&mut self, factor: f64, focal: Vec2) -> Result<(), ZoomError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(ZoomError::InvalidInput(format!("zoom factor {factor} must be finite and > 0")));
        }
        if !focal.is_finite() {
            return Err(ZoomError::InvalidInput("focal point must be finite".into()));
        }
        let old = self.transform.scale;
        let new = (old * factor).clamp(self.min_scale, self.max_scale);
        let ratio = new / old;
        self.transform.scale = new;
        self.transform.offset = focal - (focal - self.transform.offset) * ratio;
        self.clamp_offset();
        trace!(factor, scale = new, "Zoom");
        self.publish();
        Ok(())
    }

    /// Like [`add_zoom`](Self::add_zoom) with `point` in container coordinates
    /// (origin top-left).
    pub fn add_zoom_at(&mut self, factor: f64, point: Vec2) -> Result<(), ZoomError> {
        let center = self.transform.container_size * 0.5;
        self.add_zoom(factor, point - center)
    }

    pub fn add_pan(&mut self, delta: Vec2) -> Result<(), ZoomError> {
        if !delta.is_finite() {
            return Err(ZoomError::InvalidInput("pan delta must be finite".into()));
        }
        self.transform.offset = self.transform.offset + delta;
        self.clamp_offset();
        self.publish();
        Ok(())
    }

    /// Mouse wheel intake. With the zoom modifier held the wheel zooms toward
    /// `pointer` (container coordinates); otherwise it pans vertically.
    pub fn scroll(&mut self, delta_y: f64, zoom_modifier: bool, pointer: Vec2) -> Result<(), ZoomError> {
        if !delta_y.is_finite() {
            return Err(ZoomError::InvalidInput("scroll delta must be finite".into()));
        }
        if zoom_modifier {
            self.add_zoom_at(self.scroll_zoom_base.powf(-delta_y), pointer)
        } else {
            self.add_pan(Vec2::new(0.0, -delta_y * self.scroll_pan_step))
        }
    }

    /// Back to scale 1, centered.
    pub fn reset(&mut self) {
        self.transform = ZoomTransform::identity(self.transform.container_size, self.transform.content_size);
        self.publish();
    }

    /// New container size; keeps scale and offset except where the new
    /// bounds force a change.
    pub fn resize(&mut self, container_size: Vec2) -> Result<(), ZoomError> {
        check_size("container size", container_size)?;
        self.transform.container_size = container_size;
        self.clamp_offset();
        self.publish();
        Ok(())
    }

    /// A new spread was laid out; starts over from the identity transform.
    pub fn set_content_size(&mut self, content_size: Vec2) -> Result<(), ZoomError> {
        check_size("content size", content_size)?;
        self.transform.content_size = content_size;
        self.reset();
        Ok(())
    }

    fn clamp_offset(&mut self) {
        let bounds = self.transform.pan_bounds(self.min_visible_fraction);
        let offset = &mut self.transform.offset;
        offset.x = offset.x.clamp(-bounds.x, bounds.x);
        offset.y = offset.y.clamp(-bounds.y, bounds.y);
    }

    fn publish(&self) {
        self.publisher.send_replace(self.transform);
    }
}
