//! Page identity and decoded page bitmaps.

use std::fmt;
use std::sync::Arc;

use image::RgbaImage;
use page_scale::presets::Size;

use crate::sampler::{SamplerBackend, SamplerFilter};

/// Opaque identity of one page: the book it belongs to and its index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    pub book: Arc<str>,
    pub index: u32,
}

impl PageId {
    pub fn new(book: impl Into<Arc<str>>, index: u32) -> Self {
        Self {
            book: book.into(),
            index,
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.book, self.index)
    }
}

/// A page as navigation knows it before decoding.
///
/// The bytes are fetched lazily through a byte provider keyed by `id`.
/// `natural_size` is filled in when the server reports page dimensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageSource {
    pub id: PageId,
    pub natural_size: Option<Size>,
}

impl PageSource {
    pub fn new(id: PageId) -> Self {
        Self {
            id,
            natural_size: None,
        }
    }

    pub fn with_natural_size(mut self, size: Size) -> Self {
        self.natural_size = Some(size);
        self
    }
}

/// Exact cache identity of a decoded bitmap.
///
/// `target` is the requested bounding box, not the fitted output size.
/// The filter is not part of the key: it is derived from the backend and the
/// scale direction, so two requests differing only in filter share an entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub page: PageId,
    pub target: Size,
    pub backend: SamplerBackend,
}

impl CacheKey {
    pub fn new(page: PageId, target: Size, backend: SamplerBackend) -> Self {
        Self {
            page,
            target,
            backend,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}x{}/{}",
            self.page, self.target.w, self.target.h, self.backend
        )
    }
}

/// Immutable RGBA8 bitmap produced by a decode, shared read-only via `Arc`.
#[derive(Clone, Debug)]
pub struct DecodedPage {
    key: CacheKey,
    filter: SamplerFilter,
    natural_size: Size,
    image: RgbaImage,
}

impl DecodedPage {
    pub fn new(key: CacheKey, filter: SamplerFilter, natural_size: Size, image: RgbaImage) -> Self {
        Self {
            key,
            filter,
            natural_size,
            image,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Filter actually applied (after direction and backend substitution).
    pub fn filter(&self) -> SamplerFilter {
        self.filter
    }

    /// Dimensions of the source image before resampling.
    pub fn natural_size(&self) -> Size {
        self.natural_size
    }

    pub fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Tightly packed RGBA8 rows.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Bytes actually held by the bitmap.
    pub fn byte_size(&self) -> usize {
        self.image.as_raw().len()
    }
}
