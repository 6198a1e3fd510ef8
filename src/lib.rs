//! # Manga Page Pipeline
//!
//! The page pipeline behind a manga/comic reader: turning fetched page bytes
//! into display-sized bitmaps, grouping them into spreads, driving a zoom/pan
//! viewport, and reloading pages when the server reports changes.
//!
//! ## Architecture
//!
//! - `sampler`: the compiled-in resampling backends, their filters and the
//!   registry that probes which of them run here
//! - `processing`: page identity and the decoder over the sampler backends
//! - `cache`: byte-budget LRU image cache and in-flight decode coalescing
//! - `layout`: single/double spread planning and assembly
//! - `viewport`: zoom/pan state machine with an optional easing layer
//! - `reload`: change notifications coalesced into rate-limited reloads
//! - `session`: `request_page` and the per-book reader session
//! - `config`: validated configuration snapshots
//! - `error`: error taxonomy shared by all of the above
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use manga_page_pipeline::{ByteProvider, FetchError, PageId, PagePipeline, PageSlot, PageSource, ReaderConfig, Size};
//!
//! struct Files;
//!
//! #[async_trait]
//! impl ByteProvider for Files {
//!     async fn fetch(&self, source: &PageSource) -> Result<Vec<u8>, FetchError> {
//!         std::fs::read(format!("{}/{:03}.png", source.id.book, source.id.index))
//!             .map_err(|e| FetchError::new(e.to_string()))
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = PagePipeline::builder(Arc::new(Files))
//!     .with_config(ReaderConfig::default())
//!     .build()?;
//! let handle = pipeline.request_page(PageSource::new(PageId::new("chapter-1", 0)), Size::new(1080, 1920));
//! if let PageSlot::Ready(page) = handle.resolved().await {
//!     println!("{}x{} via {}", page.width(), page.height(), pipeline.backend());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod error;
pub mod layout;
pub mod logging;
pub mod processing;
pub mod reload;
pub mod sampler;
pub mod session;
pub mod viewport;

pub use page_scale::presets::Size;

/// Re-export error types for convenience
pub use error::{ConfigError, DecodeError, DecodeResult, FetchError, PageError, Retryable, ZoomError};

pub use cache::{CacheStats, ImageCache};
pub use config::ReaderConfig;
pub use layout::{PageLayout, ReadingDirection, Spread, SpreadPage};
pub use processing::{CacheKey, DecodedPage, PageDecode, PageDecoder, PageId, PageSource};
pub use reload::{ChangeEvent, ReloadCoalescer, ReloadTarget, ResourceKey, ResourceKind};
pub use sampler::{SamplerBackend, SamplerFilter, SamplerPreset, SamplerRegistry};
pub use session::{ByteProvider, PageHandle, PagePipeline, PageSlot, ReaderSession};
pub use viewport::{Vec2, ViewportEngine, ZoomTransform};
