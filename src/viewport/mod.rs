//! # Viewport
//!
//! - [`zoom`]: the discrete zoom/pan state machine and its observable
//! - [`easing`]: optional time-stepped smoothing layered on top

pub mod easing;
pub mod zoom;

pub use easing::ZoomEasing;
pub use zoom::{Vec2, ViewportEngine, ZoomTransform};
