//! # Page Pipeline
//!
//! `request_page(source, target)` is the single entry point for page bitmaps.
//!
//! ## Flow
//!
//! 1. Cancel in-flight decodes of the same page for a different target
//! 2. Cache hit: the handle is ready immediately
//! 3. A decode for the same key is running: join it
//! 4. Otherwise fetch the bytes, decode on the blocking pool, publish to the
//!    cache and every waiter
//!
//! Failures stay local to the page: the handle resolves to
//! [`PageSlot::Failed`] and nothing is cached, so a later request retries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use page_scale::presets::Size;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, DecodeOutcome, ImageCache, InflightDecodes, Lookup, SharedDecode};
use crate::config::ReaderConfig;
use crate::core::CancellationToken;
use crate::error::{ConfigError, DecodeError, FetchError, PageError};
use crate::processing::{CacheKey, DecodedPage, PageDecode, PageDecoder, PageSource};
use crate::sampler::{SamplerBackend, SamplerFilter, SamplerRegistry};

/// Supplies compressed page bytes, usually from the media server.
#[async_trait]
pub trait ByteProvider: Send + Sync + 'static {
    async fn fetch(&self, source: &PageSource) -> Result<Vec<u8>, FetchError>;
}

/// What a page slot currently shows.
#[derive(Clone, Debug)]
pub enum PageSlot {
    Pending,
    Ready(Arc<DecodedPage>),
    Failed(PageError),
    /// The request went stale before it finished.
    Cancelled,
}

impl PageSlot {
    pub fn is_pending(&self) -> bool {
        matches!(self, PageSlot::Pending)
    }

    pub fn page(&self) -> Option<&Arc<DecodedPage>> {
        match self {
            PageSlot::Ready(page) => Some(page),
            _ => None,
        }
    }

    fn from_outcome(outcome: DecodeOutcome) -> Self {
        match outcome {
            Ok(page) => PageSlot::Ready(page),
            Err(e) if e.is_cancelled() => PageSlot::Cancelled,
            Err(e) => PageSlot::Failed(e),
        }
    }
}

/// Observable result of one `request_page` call.
#[derive(Clone, Debug)]
pub struct PageHandle {
    key: CacheKey,
    rx: watch::Receiver<PageSlot>,
}

impl PageHandle {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn current(&self) -> PageSlot {
        self.rx.borrow().clone()
    }

    /// Receiver that sees every slot change.
    pub fn subscribe(&self) -> watch::Receiver<PageSlot> {
        self.rx.clone()
    }

    /// True if both handles observe the same request.
    pub fn same_request(&self, other: &PageHandle) -> bool {
        self.rx.same_channel(&other.rx)
    }

    /// Wait until the slot leaves `Pending`.
    pub async fn resolved(&self) -> PageSlot {
        let mut rx = self.rx.clone();
        match rx.wait_for(|slot| !slot.is_pending()).await {
            Ok(slot) => slot.clone(),
            // The publisher went away without resolving.
            Err(_) => PageSlot::Failed(PageError::Worker("page publisher dropped".into())),
        }
    }
}

/// Snapshot of the decode counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub requests: u64,
    pub decodes_started: u64,
    pub decodes_completed: u64,
    pub decodes_failed: u64,
    pub decodes_cancelled: u64,
    /// Requests that joined a decode already running for their key.
    pub coalesced: u64,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    coalesced: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            requests: self.requests.load(Ordering::Relaxed),
            decodes_started: self.started.load(Ordering::Relaxed),
            decodes_completed: self.completed.load(Ordering::Relaxed),
            decodes_failed: self.failed.load(Ordering::Relaxed),
            decodes_cancelled: self.cancelled.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

struct Inner {
    provider: Arc<dyn ByteProvider>,
    decoder: Arc<dyn PageDecode>,
    registry: Arc<SamplerRegistry>,
    cache: ImageCache,
    flights: InflightDecodes,
    backend: SamplerBackend,
    filter: SamplerFilter,
    counters: Counters,
}

/// Shared page pipeline. Cheap to clone; clones share cache and flights.
///
/// `request_page` spawns onto the current Tokio runtime.
#[derive(Clone)]
pub struct PagePipeline {
    inner: Arc<Inner>,
}

impl PagePipeline {
    pub fn builder(provider: Arc<dyn ByteProvider>) -> PagePipelineBuilder {
        PagePipelineBuilder::new(provider)
    }

    /// Request `source` decoded to fit within `target`.
    pub fn request_page(&self, source: PageSource, target: Size) -> PageHandle {
        let inner = &self.inner;
        Counters::bump(&inner.counters.requests);
        let key = CacheKey::new(source.id.clone(), target, inner.backend);
        let (tx, rx) = watch::channel(PageSlot::Pending);
        let handle = PageHandle {
            key: key.clone(),
            rx,
        };

        if target.is_empty() {
            let err = DecodeError::InvalidInput(format!("target size {}x{} is empty", target.w, target.h));
            tx.send_replace(PageSlot::Failed(err.into()));
            return handle;
        }

        inner.flights.cancel_stale(&source.id, &key);
        let lookup = inner.flights.join_or_start(&key, &inner.cache, |id, cancel| {
            self.start_decode(source, key.clone(), id, cancel)
        });
        let decode = match lookup {
            Lookup::Cached(page) => {
                tx.send_replace(PageSlot::Ready(page));
                return handle;
            }
            Lookup::Joined(decode) => {
                Counters::bump(&inner.counters.coalesced);
                decode
            }
            Lookup::Started(decode) => decode,
        };
        tokio::spawn(async move {
            tx.send_replace(PageSlot::from_outcome(decode.await));
        });
        handle
    }

    fn start_decode(
        &self,
        source: PageSource,
        key: CacheKey,
        id: u64,
        cancel: CancellationToken,
    ) -> SharedDecode {
        Counters::bump(&self.inner.counters.started);
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.run_decode(source, key, id, cancel).await });
        async move {
            task.await
                .unwrap_or_else(|e| Err(PageError::Worker(e.to_string().into())))
        }
        .boxed()
        .shared()
    }

    /// Cached bitmap for `source` at `target`, if any.
    pub fn cached(&self, source: &PageSource, target: Size) -> Option<Arc<DecodedPage>> {
        let key = CacheKey::new(source.id.clone(), target, self.inner.backend);
        self.inner.cache.get(&key)
    }

    /// Forget everything decoded for a book and abandon its running decodes.
    pub fn invalidate_book(&self, book: &str) -> usize {
        let cancelled = self.inner.flights.cancel_book(book);
        let removed = self.inner.cache.invalidate_book(book);
        debug!(book, cancelled, removed, "Invalidated book");
        removed
    }

    pub fn backend(&self) -> SamplerBackend {
        self.inner.backend
    }

    pub fn filter(&self) -> SamplerFilter {
        self.inner.filter
    }

    pub fn registry(&self) -> &Arc<SamplerRegistry> {
        &self.inner.registry
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn stats(&self) -> PipelineStats {
        self.inner.counters.snapshot()
    }

    /// Decodes currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.flights.len()
    }
}

impl Inner {
    async fn run_decode(
        &self,
        source: PageSource,
        key: CacheKey,
        id: u64,
        cancel: CancellationToken,
    ) -> DecodeOutcome {
        let outcome = self.fetch_and_decode(&source, &key, &cancel).await.map(Arc::new);
        let published = self.flights.complete(&key, id, outcome.as_ref().ok(), &self.cache);
        let outcome = if published {
            outcome
        } else {
            Err(DecodeError::Cancelled.into())
        };
        match &outcome {
            Ok(page) => {
                Counters::bump(&self.counters.completed);
                debug!(key = %key, w = page.width(), h = page.height(), "Page ready");
            }
            Err(e) if e.is_cancelled() => {
                Counters::bump(&self.counters.cancelled);
                debug!(key = %key, "Decode abandoned");
            }
            Err(e) => {
                Counters::bump(&self.counters.failed);
                warn!(key = %key, category = e.category(), error = %e, "Page failed");
            }
        }
        outcome
    }

    async fn fetch_and_decode(
        &self,
        source: &PageSource,
        key: &CacheKey,
        cancel: &CancellationToken,
    ) -> Result<DecodedPage, PageError> {
        let bytes: Arc<[u8]> = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DecodeError::Cancelled.into()),
            fetched = self.provider.fetch(source) => fetched?.into(),
        };
        match self.decode_blocking(key, Arc::clone(&bytes), key.backend, cancel).await {
            Err(PageError::Decode(DecodeError::BackendUnavailable(backend)))
                if backend != self.registry.fallback_backend() =>
            {
                let fallback = self.registry.fallback_backend();
                warn!(key = %key, %backend, %fallback, "Backend failed at runtime, retrying on fallback");
                self.decode_blocking(key, bytes, fallback, cancel).await
            }
            other => other,
        }
    }

    async fn decode_blocking(
        &self,
        key: &CacheKey,
        bytes: Arc<[u8]>,
        backend: SamplerBackend,
        cancel: &CancellationToken,
    ) -> Result<DecodedPage, PageError> {
        let decoder = Arc::clone(&self.decoder);
        let page = key.page.clone();
        let target = key.target;
        let filter = self.filter;
        let cancel = cancel.clone();
        let decoded = tokio::task::spawn_blocking(move || {
            decoder.decode(&page, &bytes, target, backend, filter, &cancel)
        })
        .await
        .map_err(|e| PageError::Worker(e.to_string().into()))?;
        Ok(decoded?)
    }
}

/// Builder for [`PagePipeline`].
pub struct PagePipelineBuilder {
    provider: Arc<dyn ByteProvider>,
    config: ReaderConfig,
    registry: Option<Arc<SamplerRegistry>>,
    decoder: Option<Arc<dyn PageDecode>>,
}

impl PagePipelineBuilder {
    pub fn new(provider: Arc<dyn ByteProvider>) -> Self {
        Self {
            provider,
            config: ReaderConfig::default(),
            registry: None,
            decoder: None,
        }
    }

    pub fn with_config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an already probed registry instead of probing at build time.
    pub fn with_registry(mut self, registry: Arc<SamplerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replace the decoder, e.g. with an instrumented one.
    pub fn with_decoder(mut self, decoder: Arc<dyn PageDecode>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn build(self) -> Result<PagePipeline, ConfigError> {
        self.config.validate()?;
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(SamplerRegistry::probe(&self.config.decode.disabled_backends)));
        let backend = registry.resolve(self.config.decode.backend());
        let filter = self.config.decode.filter();
        let decoder = self
            .decoder
            .unwrap_or_else(|| Arc::new(PageDecoder::new(Arc::clone(&registry))));
        info!(
            %backend,
            %filter,
            budget_bytes = self.config.cache.budget_bytes,
            "Page pipeline ready"
        );
        Ok(PagePipeline {
            inner: Arc::new(Inner {
                provider: self.provider,
                decoder,
                registry,
                cache: ImageCache::new(self.config.cache.budget_bytes),
                flights: InflightDecodes::new(),
                backend,
                filter,
                counters: Counters::default(),
            }),
        })
    }
}

