// SPDX-License-Identifier: MIT
//! # page-scale: Fit-to-Box Scaling for Decoded Pages
//!
//! This crate computes scaling plans for page bitmaps and performs the actual
//! resampling on the CPU. It is deliberately ignorant of pages, caches and
//! backend selection: callers hand it tightly packed RGBA8 pixels and a plan,
//! and get RGBA8 pixels back.
//!
//! ## Key Components
//!
//! - [`presets`]: Scaling plan computation (fit within a box, aspect kept)
//!   and scale direction classification
//! - [`cpu`]: SIMD resampler built on fast_image_resize, with both
//!   convolution (area-aware) and interpolation (texture-sampling style) modes
//!
//! ## Scale Direction
//!
//! Every plan knows whether it shrinks, enlarges or preserves the input.
//! Callers use [`presets::ScaleDirection`] to pick a kernel: wide kernels such
//! as Lanczos3 only pay off when shrinking, so enlargement should use a cheaper
//! cubic.
//!
//! ## Usage Example
//!
//! ```rust
//! use page_scale::cpu::{resize_rgba, Kernel, ResampleMode};
//! use page_scale::presets::{build_plan, Size};
//!
//! let input = Size { w: 1600, h: 2400 };
//! let plan = build_plan(input, Size { w: 800, h: 800 });
//! assert_eq!((plan.out.w, plan.out.h), (533, 800));
//!
//! let pixels = vec![255u8; input.rgba_len()];
//! let mut resizer = fast_image_resize::Resizer::new();
//! let out = resize_rgba(
//!     &mut resizer,
//!     &pixels,
//!     &plan,
//!     ResampleMode::Convolution(Kernel::Lanczos3),
//! )?;
//! assert_eq!(out.len(), plan.out.rgba_len());
//! # Ok::<(), page_scale::cpu::ScaleError>(())
//! ```

pub mod cpu;
pub mod presets;

pub use cpu::{resize_rgba, Kernel, ResampleMode, ScaleError};
pub use presets::{build_plan, ScaleDirection, ScalePlan, Size};
