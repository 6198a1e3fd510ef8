//! Integration tests for `request_page`: coalescing, failure isolation,
//! stale-request cancellation and the cache in front of the decoder.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{page, pipeline, MockProvider};
use futures_util::future::join_all;
use manga_page_pipeline::{
    DecodeError, PageError, PageHandle, PagePipeline, PageSlot, ReaderConfig, SamplerBackend,
    SamplerPreset, Size,
};
use tokio::time::timeout;

const BOX: Size = Size::new(100, 100);

async fn resolved(handle: &PageHandle) -> PageSlot {
    timeout(Duration::from_secs(10), handle.resolved())
        .await
        .expect("page resolved in time")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_identical_requests_decode_once() {
    let provider = Arc::new(MockProvider::new(Size::new(200, 300)).with_delay(Duration::from_millis(50)));
    let (pipeline, decoder) = pipeline(Arc::clone(&provider), ReaderConfig::default());

    let handles: Vec<_> = (0..8).map(|_| pipeline.request_page(page("b1", 0), BOX)).collect();
    let slots = join_all(handles.iter().map(|h| h.resolved())).await;

    let pages: Vec<_> = slots
        .iter()
        .map(|slot| slot.page().cloned().expect("every requester sees the page"))
        .collect();
    assert!(pages.iter().all(|p| Arc::ptr_eq(p, &pages[0])));
    assert_eq!(pages[0].size(), Size::new(67, 100));
    assert_eq!(decoder.decodes(), 1);
    assert_eq!(provider.fetches(), 1);

    let stats = pipeline.stats();
    assert_eq!(stats.requests, 8);
    assert_eq!(stats.decodes_started, 1);
    assert_eq!(stats.coalesced, 7);
    assert_eq!(pipeline.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_corrupt_page_fails_alone_and_recovers() {
    let provider = Arc::new(MockProvider::new(Size::new(200, 300)));
    provider.corrupt_page(3);
    let (pipeline, _) = pipeline(Arc::clone(&provider), ReaderConfig::default());

    let handles: Vec<_> = (0..10).map(|i| pipeline.request_page(page("b1", i), BOX)).collect();
    let slots = join_all(handles.iter().map(|h| h.resolved())).await;

    for (i, slot) in slots.iter().enumerate() {
        if i == 3 {
            match slot {
                PageSlot::Failed(PageError::Decode(DecodeError::CorruptData(_))) => {}
                other => panic!("page 3 should fail as corrupt, got {other:?}"),
            }
        } else {
            assert!(slot.page().is_some(), "page {i} should be ready, got {slot:?}");
        }
    }
    assert!(pipeline.cached(&page("b1", 2), BOX).is_some());
    assert!(pipeline.cached(&page("b1", 4), BOX).is_some());
    assert!(pipeline.cached(&page("b1", 3), BOX).is_none());
    assert_eq!(pipeline.stats().decodes_failed, 1);

    // The server fixes the page; a later request must not see a cached error.
    provider.repair_page(3);
    let retry = pipeline.request_page(page("b1", 3), BOX);
    let slot = resolved(&retry).await;
    let fixed = slot.page().expect("repaired page decodes");
    assert_eq!(fixed.key(), handles[3].key());
    assert!(pipeline.cached(&page("b1", 3), BOX).is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fetch_failure_is_a_page_error() {
    let provider = Arc::new(MockProvider::new(Size::new(200, 300)));
    provider.fail_page(1);
    let (pipeline, decoder) = pipeline(Arc::clone(&provider), ReaderConfig::default());

    let slot = resolved(&pipeline.request_page(page("b1", 1), BOX)).await;
    match slot {
        PageSlot::Failed(e) => assert_eq!(e.category(), "fetch"),
        other => panic!("expected fetch failure, got {other:?}"),
    }
    assert_eq!(decoder.decodes(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_target_cancels_stale_request() {
    let provider = Arc::new(MockProvider::new(Size::new(200, 300)).with_delay(Duration::from_millis(200)));
    let (pipeline, decoder) = pipeline(Arc::clone(&provider), ReaderConfig::default());

    let stale = pipeline.request_page(page("b1", 0), BOX);
    let fresh = pipeline.request_page(page("b1", 0), Size::new(200, 200));

    assert!(matches!(resolved(&stale).await, PageSlot::Cancelled));
    let slot = resolved(&fresh).await;
    assert_eq!(slot.page().map(|p| p.size()), Some(Size::new(133, 200)));

    assert!(pipeline.cached(&page("b1", 0), BOX).is_none());
    assert_eq!(decoder.decodes(), 1);
    assert_eq!(pipeline.stats().decodes_cancelled, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cache_hit_is_ready_immediately() {
    let provider = Arc::new(MockProvider::new(Size::new(200, 300)));
    let (pipeline, decoder) = pipeline(Arc::clone(&provider), ReaderConfig::default());

    let first = resolved(&pipeline.request_page(page("b1", 0), BOX)).await;
    let again = pipeline.request_page(page("b1", 0), BOX);
    match (first, again.current()) {
        (PageSlot::Ready(a), PageSlot::Ready(b)) => assert!(Arc::ptr_eq(&a, &b)),
        other => panic!("expected an immediate cache hit, got {other:?}"),
    }
    assert_eq!(decoder.decodes(), 1);
    assert_eq!(provider.fetches(), 1);
    assert_eq!(pipeline.cache_stats().hits, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalidate_book_forces_a_new_decode() {
    let provider = Arc::new(MockProvider::new(Size::new(200, 300)));
    let (pipeline, decoder) = pipeline(Arc::clone(&provider), ReaderConfig::default());

    resolved(&pipeline.request_page(page("b1", 0), BOX)).await;
    resolved(&pipeline.request_page(page("b2", 0), BOX)).await;
    assert_eq!(pipeline.invalidate_book("b1"), 1);
    assert!(pipeline.cached(&page("b2", 0), BOX).is_some());

    resolved(&pipeline.request_page(page("b1", 0), BOX)).await;
    assert_eq!(decoder.decodes(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cache_stays_within_budget() {
    let provider = Arc::new(MockProvider::new(Size::new(200, 300)));
    let mut config = ReaderConfig::default();
    // Each 67x100 page is 26 800 bytes; two fit.
    config.cache.budget_bytes = 60_000;
    let (pipeline, _) = pipeline(Arc::clone(&provider), config);

    for i in 0..5 {
        resolved(&pipeline.request_page(page("b1", i), BOX)).await;
    }
    let stats = pipeline.cache_stats();
    assert_eq!(stats.entries, 2);
    assert!(stats.memory_used <= stats.memory_limit);
    assert_eq!(stats.evictions, 3);
    // Least recently used pages went first.
    assert!(pipeline.cached(&page("b1", 0), BOX).is_none());
    assert!(pipeline.cached(&page("b1", 4), BOX).is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disabled_backend_resolves_to_next_best() {
    let provider = Arc::new(MockProvider::new(Size::new(200, 300)));
    let mut config = ReaderConfig::default();
    config.decode.preset = SamplerPreset::NativeLanczos;
    config.decode.disabled_backends = vec![SamplerBackend::Native];
    let pipeline = PagePipeline::builder(provider).with_config(config).build().unwrap();

    assert!(!pipeline.registry().is_available(SamplerBackend::Native));
    assert_ne!(pipeline.backend(), SamplerBackend::Native);
    let handle = pipeline.request_page(page("b1", 0), BOX);
    assert_eq!(handle.key().backend, pipeline.backend());
    let slot = resolved(&handle).await;
    assert_eq!(slot.page().map(|p| p.key().backend), Some(pipeline.backend()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_empty_target_fails_without_fetching() {
    let provider = Arc::new(MockProvider::new(Size::new(200, 300)));
    let (pipeline, _) = pipeline(Arc::clone(&provider), ReaderConfig::default());

    let slot = pipeline.request_page(page("b1", 0), Size::new(0, 100)).current();
    assert!(matches!(slot, PageSlot::Failed(PageError::Decode(DecodeError::InvalidInput(_)))));
    assert_eq!(provider.fetches(), 0);
}
