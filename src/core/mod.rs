//! # Core Infrastructure Module
//!
//! Small building blocks shared by the decode pipeline and the reload
//! coalescer.
//!
//! Decode cancellation is cooperative: a decode whose target size went stale
//! is not interrupted, it checks its [`CancellationToken`] between stages
//! (after fetch, after decode, before resample) and gives up early. The fetch
//! stage also races the provider against `cancelled().await`.
//!
//! ```
//! use manga_page_pipeline::core::CancellationToken;
//!
//! let token = CancellationToken::new();
//! let worker = token.clone();
//! token.cancel();
//! assert!(worker.is_cancelled());
//! ```

pub use tokio_util::sync::CancellationToken;
