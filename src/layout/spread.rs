//! # Spread Assembly
//!
//! A spread is what the reader shows at once: one page, or two pages side by
//! side. Two separate questions are answered here:
//!
//! - **Planning** ([`plan_spreads`]): given the page count, the layout and any
//!   known page sizes, which page indices form each spread.
//! - **Assembly** ([`SpreadAssembler::assemble`]): given the current slots in
//!   fetch order (decoded, pending or failed), which of them are shown and in
//!   what visual order.
//!
//! Reading direction only swaps the visual left/right assignment of a pair;
//! fetch order is always ascending page order. A page wider than the
//! configured aspect ratio is never paired. A pending or failed page keeps its
//! slot as a placeholder; assembly never waits for it.

use std::sync::Arc;

use page_scale::presets::Size;
use serde::{Deserialize, Serialize};

use crate::error::PageError;
use crate::processing::{DecodedPage, PageId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadingDirection {
    #[default]
    LeftToRight,
    RightToLeft,
}

/// Page grouping chosen by the reader.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageLayout {
    #[default]
    SinglePage,
    /// First page alone (the cover), then pairs.
    DoublePages,
    /// Pairs from the first page on.
    DoublePagesNoCover,
}

impl PageLayout {
    pub fn is_double(self) -> bool {
        !matches!(self, PageLayout::SinglePage)
    }
}

/// How many slots a spread may fill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpreadWidth {
    Single,
    Double,
}

impl SpreadWidth {
    /// Double layouts collapse to single pages in a portrait container when
    /// `auto_single_on_portrait` is set.
    pub fn for_container(layout: PageLayout, container: Size, auto_single_on_portrait: bool) -> Self {
        if !layout.is_double() {
            return SpreadWidth::Single;
        }
        if auto_single_on_portrait && container.h > container.w {
            SpreadWidth::Single
        } else {
            SpreadWidth::Double
        }
    }

    pub fn slots(self) -> usize {
        match self {
            SpreadWidth::Single => 1,
            SpreadWidth::Double => 2,
        }
    }
}

/// One slot of a spread.
#[derive(Clone, Debug)]
pub enum SpreadPage {
    Ready(Arc<DecodedPage>),
    /// Still decoding; render a loading placeholder.
    Pending(PageId),
    /// Render an inline error placeholder.
    Failed(PageId, PageError),
}

impl SpreadPage {
    pub fn id(&self) -> &PageId {
        match self {
            SpreadPage::Ready(page) => &page.key().page,
            SpreadPage::Pending(id) | SpreadPage::Failed(id, _) => id,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SpreadPage::Ready(_))
    }

    /// Aspect ratio of a decoded page; placeholders have none.
    pub fn aspect_ratio(&self) -> Option<f64> {
        match self {
            SpreadPage::Ready(page) => Some(page.natural_size().aspect_ratio()),
            _ => None,
        }
    }
}

/// One or two slots in visual (left to right on screen) order.
#[derive(Clone, Debug)]
pub struct Spread {
    pages: Vec<SpreadPage>,
    direction: ReadingDirection,
    consumed: usize,
}

impl Spread {
    /// Slots in on-screen order, leftmost first.
    pub fn pages(&self) -> &[SpreadPage] {
        &self.pages
    }

    pub fn direction(&self) -> ReadingDirection {
        self.direction
    }

    /// How many input slots this spread used, in fetch order.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn is_single(&self) -> bool {
        self.pages.len() == 1
    }

    /// Page ids in fetch (reading) order.
    pub fn fetch_order(&self) -> Vec<PageId> {
        let mut ids: Vec<PageId> = self.pages.iter().map(|p| p.id().clone()).collect();
        if self.direction == ReadingDirection::RightToLeft {
            ids.reverse();
        }
        ids
    }
}

/// Groups slots into spreads under a wide-page threshold.
#[derive(Clone, Copy, Debug)]
pub struct SpreadAssembler {
    wide_page_ratio: f64,
}

impl SpreadAssembler {
    pub fn new(wide_page_ratio: f64) -> Self {
        Self { wide_page_ratio }
    }

    pub fn is_wide(&self, page: &SpreadPage) -> bool {
        page.aspect_ratio()
            .is_some_and(|ratio| ratio > self.wide_page_ratio)
    }

    /// Build the spread starting at `pages[0]`. `pages` is in fetch order.
    ///
    /// Returns `None` for an empty input.
    pub fn assemble(
        &self,
        pages: &[SpreadPage],
        direction: ReadingDirection,
        width: SpreadWidth,
    ) -> Option<Spread> {
        let first = pages.first()?;
        let pair = match (width, pages.get(1)) {
            (SpreadWidth::Double, Some(second)) if !self.is_wide(first) && !self.is_wide(second) => {
                Some(second)
            }
            _ => None,
        };
        let spread = match pair {
            None => Spread {
                pages: vec![first.clone()],
                direction,
                consumed: 1,
            },
            Some(second) => {
                let mut slots = vec![first.clone(), second.clone()];
                if direction == ReadingDirection::RightToLeft {
                    slots.reverse();
                }
                Spread {
                    pages: slots,
                    direction,
                    consumed: 2,
                }
            }
        };
        Some(spread)
    }
}

/// Page indices of every spread in a book, in reading order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpreadPlan {
    spreads: Vec<Vec<u32>>,
}

impl SpreadPlan {
    pub fn len(&self) -> usize {
        self.spreads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spreads.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&[u32]> {
        self.spreads.get(index).map(Vec::as_slice)
    }

    /// Index of the spread that shows `page`.
    pub fn spread_of(&self, page: u32) -> Option<usize> {
        self.spreads.iter().position(|s| s.contains(&page))
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u32]> {
        self.spreads.iter().map(Vec::as_slice)
    }
}

/// Group `page_sizes.len()` pages into spreads.
///
/// `page_sizes[i]` is the natural size of page `i` when known. A known wide
/// page always stands alone and pairing resumes with the page after it.
pub fn plan_spreads(layout: PageLayout, page_sizes: &[Option<Size>], wide_page_ratio: f64) -> SpreadPlan {
    let n = page_sizes.len() as u32;
    let wide = |i: u32| {
        page_sizes[i as usize].is_some_and(|s| s.aspect_ratio() > wide_page_ratio)
    };
    let mut spreads = Vec::new();
    let mut i = 0u32;
    if layout == PageLayout::SinglePage {
        spreads.extend((0..n).map(|p| vec![p]));
        return SpreadPlan { spreads };
    }
    if layout == PageLayout::DoublePages && n > 0 {
        spreads.push(vec![0]);
        i = 1;
    }
    while i < n {
        if wide(i) || i + 1 == n || wide(i + 1) {
            spreads.push(vec![i]);
            i += 1;
        } else {
            spreads.push(vec![i, i + 1]);
            i += 2;
        }
    }
    SpreadPlan { spreads }
}
