//! # Processing Module
//!
//! Turns fetched page bytes into display-sized bitmaps.
//!
//! - [`page`]: page identity, sources, cache keys and decoded bitmaps
//! - [`decoder`]: the decode contract and its implementation over the sampler backends

pub mod decoder;
pub mod page;

pub use decoder::{PageDecode, PageDecoder};
pub use page::{CacheKey, DecodedPage, PageId, PageSource};
