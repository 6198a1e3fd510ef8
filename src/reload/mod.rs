//! # Reload Coalescing
//!
//! Server-pushed change notifications are collapsed into debounced,
//! rate-limited reloads per resource.
//!
//! - [`events`]: notification and key types, key mappers
//! - [`coalescer`]: the debounce/cool-down actor and the reload callback trait

pub mod coalescer;
pub mod events;

pub use coalescer::{CoalescerHandle, CoalescerStats, ReloadCoalescer, ReloadTarget};
pub use events::{book_key, receiver_stream, ChangeEvent, KeyMapper, ResourceKey, ResourceKind};
