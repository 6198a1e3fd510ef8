//! Common test utilities shared by the integration tests.
//!
//! - PNG fixtures generated in memory
//! - a scripted [`ByteProvider`] with per-page failure injection
//! - a decoder that counts how often it actually runs
//! - a reload target that records when it was called

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};
use manga_page_pipeline::core::CancellationToken;
use manga_page_pipeline::{
    ByteProvider, DecodeResult, DecodedPage, FetchError, PageDecode, PageDecoder, PageId,
    PagePipeline, PageSource, ReaderConfig, ReloadTarget, ResourceKey, SamplerBackend,
    SamplerFilter, SamplerRegistry, Size,
};
use parking_lot::Mutex;
use tokio::time::Instant;

/// Encode a `w`x`h` gradient page as PNG. `shade` tints the page so
/// different versions of the same page decode to different pixels.
pub fn png_page(w: u32, h: u32, shade: u8) -> Vec<u8> {
    let img = RgbaImage::from_fn(w, h, |x, y| {
        Rgba([
            (x * 255 / w.max(1)) as u8,
            (y * 255 / h.max(1)) as u8,
            shade,
            255,
        ])
    });
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode PNG fixture");
    buf
}

/// A PNG cut off halfway through its image data.
pub fn truncated_png(w: u32, h: u32) -> Vec<u8> {
    let mut bytes = png_page(w, h, 0);
    bytes.truncate(bytes.len() / 2);
    bytes
}

/// Registry with every backend probed on this machine.
pub fn registry() -> Arc<SamplerRegistry> {
    Arc::new(SamplerRegistry::probe(&[]))
}

/// Byte provider serving generated pages.
///
/// Pages are `page_size` unless overridden. Individual pages can be switched
/// to corrupt bytes or an outright fetch failure and back.
pub struct MockProvider {
    page_size: Size,
    sizes: Mutex<HashMap<u32, Size>>,
    corrupt: Mutex<HashSet<u32>>,
    unreachable: Mutex<HashSet<u32>>,
    shade: Mutex<u8>,
    delay: Duration,
    fetches: AtomicUsize,
}

impl MockProvider {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            sizes: Mutex::new(HashMap::new()),
            corrupt: Mutex::new(HashSet::new()),
            unreachable: Mutex::new(HashSet::new()),
            shade: Mutex::new(0),
            delay: Duration::ZERO,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Every fetch waits this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_page_size(self, index: u32, size: Size) -> Self {
        self.sizes.lock().insert(index, size);
        self
    }

    pub fn corrupt_page(&self, index: u32) {
        self.corrupt.lock().insert(index);
    }

    pub fn fail_page(&self, index: u32) {
        self.unreachable.lock().insert(index);
    }

    /// Serve good bytes for `index` again.
    pub fn repair_page(&self, index: u32) {
        self.corrupt.lock().remove(&index);
        self.unreachable.lock().remove(&index);
    }

    /// Publish a new version of every page.
    pub fn republish(&self, shade: u8) {
        *self.shade.lock() = shade;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ByteProvider for MockProvider {
    async fn fetch(&self, source: &PageSource) -> Result<Vec<u8>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let index = source.id.index;
        if self.unreachable.lock().contains(&index) {
            return Err(FetchError::new(format!("page {index} unreachable")));
        }
        let size = self.sizes.lock().get(&index).copied().unwrap_or(self.page_size);
        if self.corrupt.lock().contains(&index) {
            return Ok(truncated_png(size.w, size.h));
        }
        let shade = *self.shade.lock();
        Ok(png_page(size.w, size.h, shade))
    }
}

/// [`PageDecoder`] that counts decodes and can be slowed down.
pub struct CountingDecoder {
    inner: PageDecoder,
    decodes: AtomicUsize,
    delay: Duration,
}

impl CountingDecoder {
    pub fn new(registry: Arc<SamplerRegistry>) -> Self {
        Self {
            inner: PageDecoder::new(registry),
            decodes: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

impl PageDecode for CountingDecoder {
    fn decode(
        &self,
        page: &PageId,
        bytes: &[u8],
        target: Size,
        backend: SamplerBackend,
        filter: SamplerFilter,
        cancel: &CancellationToken,
    ) -> DecodeResult<DecodedPage> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.inner.decode(page, bytes, target, backend, filter, cancel)
    }
}

/// Pipeline over `provider` with an instrumented decoder.
pub fn pipeline(
    provider: Arc<MockProvider>,
    config: ReaderConfig,
) -> (PagePipeline, Arc<CountingDecoder>) {
    let registry = registry();
    let decoder = Arc::new(CountingDecoder::new(Arc::clone(&registry)));
    let pipeline = PagePipeline::builder(provider)
        .with_config(config)
        .with_registry(registry)
        .with_decoder(Arc::clone(&decoder) as Arc<dyn PageDecode>)
        .build()
        .expect("valid test config");
    (pipeline, decoder)
}

pub fn page(book: &str, index: u32) -> PageSource {
    PageSource::new(PageId::new(book, index))
}

/// Records when each key was reloaded.
pub struct RecordingTarget {
    origin: Instant,
    work: Duration,
    calls: Mutex<Vec<(ResourceKey, Duration)>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl RecordingTarget {
    pub fn new(origin: Instant) -> Self {
        Self::with_work(origin, Duration::ZERO)
    }

    /// Each reload takes `work` to complete.
    pub fn with_work(origin: Instant, work: Duration) -> Self {
        Self {
            origin,
            work,
            calls: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    /// Start offsets of every reload of `key`.
    pub fn calls_for(&self, key: &ResourceKey) -> Vec<Duration> {
        self.calls
            .lock()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// Most reloads ever running at once.
    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReloadTarget for RecordingTarget {
    async fn reload(&self, key: &ResourceKey) {
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        self.calls
            .lock()
            .push((key.clone(), Instant::now() - self.origin));
        if !self.work.is_zero() {
            tokio::time::sleep(self.work).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Assert `actual` is `expected_ms` give or take the timer's millisecond tick.
pub fn assert_at(actual: Duration, expected_ms: u64) {
    let expected = Duration::from_millis(expected_ms);
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(
        diff <= Duration::from_millis(2),
        "expected ~{expected_ms} ms, got {actual:?}"
    );
}
