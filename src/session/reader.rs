//! One open book in the reader.
//!
//! The session owns the viewport of the book and remembers which pages are on
//! screen so a coalesced reload can re-request exactly those.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use page_scale::presets::Size;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::pipeline::{PageHandle, PagePipeline, PageSlot};
use crate::config::{ReaderConfig, SpreadConfig};
use crate::error::ConfigError;
use crate::layout::{plan_spreads, PageLayout, Spread, SpreadAssembler, SpreadPage, SpreadPlan, SpreadWidth};
use crate::processing::{PageId, PageSource};
use crate::reload::{ReloadTarget, ResourceKey, ResourceKind};
use crate::viewport::{Vec2, ViewportEngine};

struct Visible {
    source: PageSource,
    target: Size,
    handle: PageHandle,
}

struct SessionState {
    pages: Vec<PageSource>,
    current: usize,
    width: SpreadWidth,
    visible: Vec<Visible>,
}

pub struct ReaderSession {
    pipeline: PagePipeline,
    book: Arc<str>,
    spread: SpreadConfig,
    assembler: SpreadAssembler,
    state: Mutex<SessionState>,
    viewport: Mutex<ViewportEngine>,
}

impl ReaderSession {
    /// Open `book` with `page_count` pages of unknown size.
    pub fn open(
        pipeline: PagePipeline,
        book: &str,
        page_count: u32,
        config: &ReaderConfig,
    ) -> Result<Self, ConfigError> {
        let pages = (0..page_count)
            .map(|i| PageSource::new(PageId::new(book, i)))
            .collect();
        Self::with_pages(pipeline, book, pages, config)
    }

    /// Open a book whose page sources (and possibly sizes) are already known.
    ///
    /// Fails if `config` does not validate.
    pub fn with_pages(
        pipeline: PagePipeline,
        book: &str,
        pages: Vec<PageSource>,
        config: &ReaderConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            pipeline,
            book: book.into(),
            spread: config.spread.clone(),
            assembler: SpreadAssembler::new(config.spread.wide_page_ratio),
            state: Mutex::new(SessionState {
                pages,
                current: 0,
                width: SpreadWidth::Single,
                visible: Vec::new(),
            }),
            viewport: Mutex::new(ViewportEngine::with_validated_config(&config.viewport)),
        })
    }

    pub fn book(&self) -> &str {
        &self.book
    }

    pub fn page_count(&self) -> usize {
        self.state.lock().pages.len()
    }

    pub fn current_spread(&self) -> usize {
        self.state.lock().current
    }

    /// Gesture intake for this session's viewport.
    pub fn viewport(&self) -> MutexGuard<'_, ViewportEngine> {
        self.viewport.lock()
    }

    /// Spread grouping for a container of this size.
    pub fn plan(&self, container: Size) -> SpreadPlan {
        let width = SpreadWidth::for_container(self.spread.layout, container, self.spread.auto_single_on_portrait);
        let state = self.state.lock();
        self.plan_for(&state.pages, width)
    }

    fn plan_for(&self, pages: &[PageSource], width: SpreadWidth) -> SpreadPlan {
        let layout = match width {
            SpreadWidth::Single => PageLayout::SinglePage,
            SpreadWidth::Double => self.spread.layout,
        };
        let sizes: Vec<Option<Size>> = pages.iter().map(|p| p.natural_size).collect();
        plan_spreads(layout, &sizes, self.spread.wide_page_ratio)
    }

    /// Show spread `index` in a container of `container` pixels.
    ///
    /// Requests the spread's pages, resets the viewport, and returns the spread
    /// as it stands right now (pending pages show as placeholders). Returns
    /// `None` if `index` is past the last spread.
    pub fn show_spread(&self, index: usize, container: Size) -> Option<Spread> {
        let width = SpreadWidth::for_container(self.spread.layout, container, self.spread.auto_single_on_portrait);
        let mut state = self.state.lock();
        let plan = self.plan_for(&state.pages, width);
        let indices = plan.get(index)?.to_vec();
        let target = Size::new(container.w / indices.len() as u32, container.h);

        let visible: Vec<Visible> = indices
            .iter()
            .map(|&i| {
                let source = state.pages[i as usize].clone();
                let handle = self.pipeline.request_page(source.clone(), target);
                Visible {
                    source,
                    target,
                    handle,
                }
            })
            .collect();
        state.visible = visible;
        state.current = index;
        state.width = if indices.len() == 2 {
            SpreadWidth::Double
        } else {
            SpreadWidth::Single
        };
        debug!(book = %self.book, index, pages = ?indices, "Showing spread");

        let slots: Vec<PageSlot> = state.visible.iter().map(|v| v.handle.current()).collect();
        let spread = self.assemble(&mut state, slots);
        drop(state);

        let mut viewport = self.viewport.lock();
        let laid_out = viewport
            .resize(Vec2::new(f64::from(container.w), f64::from(container.h)))
            .and_then(|()| match &spread {
                Some(spread) => viewport.set_content_size(content_size(spread, target)),
                None => {
                    viewport.reset();
                    Ok(())
                }
            });
        if let Err(e) = laid_out {
            warn!(book = %self.book, error = %e, "Viewport kept its previous layout");
        }
        spread
    }

    /// Wait for every visible page to resolve and return the final spread.
    ///
    /// If a reload replaces the visible requests meanwhile, waits for the new ones.
    pub async fn resolve_spread(&self) -> Option<Spread> {
        loop {
            let handles: Vec<PageHandle> = self.state.lock().visible.iter().map(|v| v.handle.clone()).collect();
            let slots = join_all(handles.iter().map(|h| h.resolved())).await;
            let mut state = self.state.lock();
            let unchanged = state.visible.len() == handles.len()
                && state
                    .visible
                    .iter()
                    .zip(&handles)
                    .all(|(v, h)| v.handle.same_request(h));
            if unchanged {
                return self.assemble(&mut state, slots);
            }
        }
    }

    /// Assemble the visible slots and learn natural sizes of decoded pages.
    fn assemble(&self, state: &mut SessionState, slots: Vec<PageSlot>) -> Option<Spread> {
        let mut spread_pages = Vec::with_capacity(slots.len());
        for (visible, slot) in state.visible.iter().zip(slots) {
            let id = visible.source.id.clone();
            spread_pages.push(match slot {
                PageSlot::Ready(page) => SpreadPage::Ready(page),
                PageSlot::Failed(e) => SpreadPage::Failed(id, e),
                PageSlot::Pending | PageSlot::Cancelled => SpreadPage::Pending(id),
            });
        }
        for page in &spread_pages {
            if let SpreadPage::Ready(decoded) = page {
                let id = &decoded.key().page;
                if let Some(source) = state.pages.iter_mut().find(|p| &p.id == id) {
                    source.natural_size.get_or_insert(decoded.natural_size());
                }
            }
        }
        self.assembler.assemble(&spread_pages, self.spread.direction, state.width)
    }

    /// Invalidate the book's cached pages and request the visible ones again.
    pub fn refresh(&self) -> usize {
        let removed = self.pipeline.invalidate_book(&self.book);
        let mut state = self.state.lock();
        for visible in state.visible.iter_mut() {
            visible.handle = self
                .pipeline
                .request_page(visible.source.clone(), visible.target);
        }
        info!(book = %self.book, removed, visible = state.visible.len(), "Reloaded book pages");
        removed
    }
}

/// Laid-out size of a spread: pages side by side.
fn content_size(spread: &Spread, target: Size) -> Vec2 {
    spread.pages().iter().fold(Vec2::ZERO, |acc, page| {
        let size = match page {
            SpreadPage::Ready(decoded) => decoded.size(),
            _ => target,
        };
        Vec2::new(acc.x + f64::from(size.w), acc.y.max(f64::from(size.h)))
    })
}

#[async_trait]
impl ReloadTarget for ReaderSession {
    async fn reload(&self, key: &ResourceKey) {
        if key.kind == ResourceKind::Book && *key.id == *self.book {
            self.refresh();
        }
    }
}
