//! # Reader Sessions
//!
//! The entry points UI layers use.
//!
//! - [`pipeline`]: `request_page`, the cache-first, coalesced, cancellable
//!   decode path shared by every open book
//! - [`reader`]: one open book: spreads, viewport and reload handling

pub mod pipeline;
pub mod reader;

pub use pipeline::{ByteProvider, PageHandle, PagePipeline, PagePipelineBuilder, PageSlot, PipelineStats};
pub use reader::ReaderSession;
