//! # Sampler Backends
//!
//! This module models the interchangeable decode+resample strategies and the
//! registry that decides which of them can run in this process.
//!
//! - [`backend`]: the closed set of backends, their filters and presets
//! - [`registry`]: platform probing, availability and default selection

pub mod backend;
pub mod registry;

pub use backend::{ResampleError, SamplerBackend, SamplerFilter, SamplerPreset};
pub use registry::{BackendStatus, SamplerRegistry};
