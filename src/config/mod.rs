//! # Configuration Module
//!
//! Immutable configuration snapshots for the page pipeline. Settings storage
//! is owned by the embedding application; it hands a validated
//! [`ReaderConfig`] to the pipeline and builds a new pipeline or session when
//! the user changes something.

pub mod config;

pub use config::{CacheConfig, DecodeConfig, ReaderConfig, ReloadConfig, SpreadConfig, ViewportConfig};
