//! # Image Cache
//!
//! - [`image_cache`]: byte-budget LRU store of decoded pages
//! - [`inflight`]: at-most-one decode per key in front of the store

pub mod image_cache;
pub mod inflight;

pub use image_cache::{CacheStats, ImageCache};
pub use inflight::{DecodeOutcome, InflightDecodes, Lookup, SharedDecode};
