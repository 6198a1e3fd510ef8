//! In-flight decode coalescing
//!
//! Sits in front of the [`ImageCache`] and guarantees at most one running
//! decode per [`CacheKey`]. Concurrent requesters for the same key receive
//! clones of one shared future.
//!
//! Lock order is always flights then cache. The decode task publishes its
//! result with [`InflightDecodes::complete`], which stores into the cache and
//! retires the flight in one critical section, so a requester either finds the
//! cached page or the (already resolved) flight, never neither.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::debug;

use super::image_cache::ImageCache;
use crate::core::CancellationToken;
use crate::error::PageError;
use crate::processing::{CacheKey, DecodedPage, PageId};

/// Result every coalesced waiter receives.
pub type DecodeOutcome = Result<Arc<DecodedPage>, PageError>;

/// Cloneable handle on one running decode.
pub type SharedDecode = Shared<BoxFuture<'static, DecodeOutcome>>;

struct Flight {
    id: u64,
    future: SharedDecode,
    cancel: CancellationToken,
}

/// How a lookup was satisfied.
pub enum Lookup {
    /// The page was already cached.
    Cached(Arc<DecodedPage>),
    /// Another requester started this decode; await the shared result.
    Joined(SharedDecode),
    /// This call started the decode.
    Started(SharedDecode),
}

#[derive(Default)]
struct FlightTable {
    flights: HashMap<CacheKey, Flight>,
    next_id: u64,
}

/// Table of running decodes keyed by cache key.
#[derive(Default)]
pub struct InflightDecodes {
    table: Mutex<FlightTable>,
}

impl InflightDecodes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached page, join a running decode, or start one.
    ///
    /// `start` receives the flight id and its cancellation token and must
    /// return the shared future of a task that eventually calls
    /// [`complete`](Self::complete) with that id. It runs under the table
    /// lock, so it must only spawn, never block.
    pub fn join_or_start(
        &self,
        key: &CacheKey,
        cache: &ImageCache,
        start: impl FnOnce(u64, CancellationToken) -> SharedDecode,
    ) -> Lookup {
        let mut table = self.table.lock();
        if let Some(page) = cache.get(key) {
            return Lookup::Cached(page);
        }
        if let Some(flight) = table.flights.get(key) {
            debug!(key = %key, "Joining in-flight decode");
            return Lookup::Joined(flight.future.clone());
        }
        table.next_id += 1;
        let id = table.next_id;
        let cancel = CancellationToken::new();
        let future = start(id, cancel.clone());
        table.flights.insert(
            key.clone(),
            Flight {
                id,
                future: future.clone(),
                cancel,
            },
        );
        Lookup::Started(future)
    }

    /// Publish a finished decode and retire its flight.
    ///
    /// A successful page is stored in the cache only while the flight is still
    /// current. Returns false when the flight was cancelled or replaced, in
    /// which case nothing was cached.
    pub fn complete(
        &self,
        key: &CacheKey,
        id: u64,
        page: Option<&Arc<DecodedPage>>,
        cache: &ImageCache,
    ) -> bool {
        let mut table = self.table.lock();
        let current = matches!(table.flights.get(key), Some(f) if f.id == id);
        if !current {
            return false;
        }
        if let Some(page) = page {
            cache.put(key.clone(), Arc::clone(page));
        }
        table.flights.remove(key);
        true
    }

    /// Cancel flights of `page` whose key differs from `keep`.
    ///
    /// Called when a page is requested at a new target size or backend; the
    /// stale decodes are abandoned and their waiters see a cancellation.
    pub fn cancel_stale(&self, page: &PageId, keep: &CacheKey) -> usize {
        self.cancel_where(|k| &k.page == page && k != keep)
    }

    /// Cancel every flight of a book.
    pub fn cancel_book(&self, book: &str) -> usize {
        self.cancel_where(|k| &*k.page.book == book)
    }

    fn cancel_where(&self, mut predicate: impl FnMut(&CacheKey) -> bool) -> usize {
        let mut table = self.table.lock();
        let stale: Vec<CacheKey> = table
            .flights
            .keys()
            .filter(|k| predicate(k))
            .cloned()
            .collect();
        for key in &stale {
            if let Some(flight) = table.flights.remove(key) {
                flight.cancel.cancel();
                debug!(key = %key, id = flight.id, "Cancelled stale decode");
            }
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.table.lock().flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::sampler::{SamplerBackend, SamplerFilter};
    use futures_util::FutureExt;
    use image::RgbaImage;
    use page_scale::presets::Size;

    fn key(index: u32, side: u32) -> CacheKey {
        CacheKey::new(PageId::new("b", index), Size::new(side, side), SamplerBackend::Native)
    }

    fn ready(key: &CacheKey) -> Arc<DecodedPage> {
        Arc::new(DecodedPage::new(
            key.clone(),
            SamplerFilter::Bicubic,
            key.target,
            RgbaImage::new(key.target.w, key.target.h),
        ))
    }

    fn pending() -> SharedDecode {
        futures_util::future::pending::<DecodeOutcome>().boxed().shared()
    }

    #[test]
    fn second_lookup_joins_the_first() {
        let flights = InflightDecodes::new();
        let cache = ImageCache::new(1 << 20);
        let k = key(0, 4);
        let mut starts = 0;
        for _ in 0..3 {
            let lookup = flights.join_or_start(&k, &cache, |_, _| {
                starts += 1;
                pending()
            });
            assert!(!matches!(lookup, Lookup::Cached(_)));
        }
        assert_eq!(starts, 1);
        assert_eq!(flights.len(), 1);
    }

    #[test]
    fn completion_caches_and_retires() {
        let flights = InflightDecodes::new();
        let cache = ImageCache::new(1 << 20);
        let k = key(0, 4);
        let mut flight_id = 0;
        flights.join_or_start(&k, &cache, |id, _| {
            flight_id = id;
            pending()
        });
        assert!(flights.complete(&k, flight_id, Some(&ready(&k)), &cache));
        assert!(flights.is_empty());
        assert!(matches!(
            flights.join_or_start(&k, &cache, |_, _| pending()),
            Lookup::Cached(_)
        ));
    }

    #[test]
    fn stale_flight_is_cancelled_and_never_cached() {
        let flights = InflightDecodes::new();
        let cache = ImageCache::new(1 << 20);
        let old = key(0, 4);
        let new = key(0, 8);
        let mut token = None;
        let mut old_id = 0;
        flights.join_or_start(&old, &cache, |id, cancel| {
            old_id = id;
            token = Some(cancel);
            pending()
        });
        assert_eq!(flights.cancel_stale(&old.page, &new), 1);
        assert!(token.unwrap().is_cancelled());
        assert!(!flights.complete(&old, old_id, Some(&ready(&old)), &cache));
        assert!(!cache.contains(&old));
    }

    #[tokio::test]
    async fn joined_waiters_share_one_result() {
        let flights = InflightDecodes::new();
        let cache = ImageCache::new(1 << 20);
        let k = key(1, 2);
        let fut = async { Err::<Arc<DecodedPage>, _>(PageError::from(DecodeError::CorruptData("x".into()))) }
            .boxed()
            .shared();
        let a = match flights.join_or_start(&k, &cache, |_, _| fut.clone()) {
            Lookup::Started(f) => f,
            _ => panic!("expected start"),
        };
        let b = match flights.join_or_start(&k, &cache, |_, _| unreachable!()) {
            Lookup::Joined(f) => f,
            _ => panic!("expected join"),
        };
        assert_eq!(a.await.unwrap_err(), b.await.unwrap_err());
    }
}
