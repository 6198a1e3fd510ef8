//! # Page Decoder
//!
//! `decode(bytes, target, backend, filter)` turns compressed page bytes into an
//! RGBA8 bitmap that fits the target bounding box.
//!
//! ## Stages
//!
//! 1. Validate inputs and the backend
//! 2. Sniff the container format and decode it with the image codecs
//! 3. Plan the output size (fit within the box, enlarging small pages)
//! 4. Resample with the backend, or keep the bitmap when the plan is identity
//!
//! The cancellation token is checked between stages. A cancelled decode
//! returns [`DecodeError::Cancelled`] and never a partial bitmap.
//!
//! The decoder holds no cache; callers offer the result to the image cache.

use std::sync::Arc;
use std::time::Instant;

use image::ImageError;
use page_scale::presets::{build_plan, ScaleDirection, Size};
use tracing::debug;

use super::page::{CacheKey, DecodedPage, PageId};
use crate::core::CancellationToken;
use crate::error::{DecodeError, DecodeResult};
use crate::sampler::{SamplerBackend, SamplerFilter, SamplerRegistry};

/// The decode contract every page decoder honours.
///
/// Implementations are synchronous and CPU-bound; the pipeline runs them on
/// the blocking pool.
pub trait PageDecode: Send + Sync {
    fn decode(
        &self,
        page: &PageId,
        bytes: &[u8],
        target: Size,
        backend: SamplerBackend,
        filter: SamplerFilter,
        cancel: &CancellationToken,
    ) -> DecodeResult<DecodedPage>;
}

/// Decoder over the backends of a probed registry.
#[derive(Clone, Debug)]
pub struct PageDecoder {
    registry: Arc<SamplerRegistry>,
}

impl PageDecoder {
    pub fn new(registry: Arc<SamplerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SamplerRegistry> {
        &self.registry
    }
}

impl PageDecode for PageDecoder {
    fn decode(
        &self,
        page: &PageId,
        bytes: &[u8],
        target: Size,
        backend: SamplerBackend,
        filter: SamplerFilter,
        cancel: &CancellationToken,
    ) -> DecodeResult<DecodedPage> {
        if bytes.is_empty() {
            return Err(DecodeError::InvalidInput("page bytes are empty".into()));
        }
        if target.is_empty() {
            return Err(DecodeError::InvalidInput(format!(
                "target size {}x{} is empty",
                target.w, target.h
            )));
        }
        if !self.registry.is_available(backend) {
            return Err(DecodeError::BackendUnavailable(backend));
        }
        check(cancel)?;

        let started = Instant::now();
        let format = image::guess_format(bytes)
            .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;
        let source = image::load_from_memory_with_format(bytes, format)
            .map_err(map_image_error)?
            .into_rgba8();
        check(cancel)?;

        let natural = Size::new(source.width(), source.height());
        let plan = build_plan(natural, target);
        let key = CacheKey::new(page.clone(), target, backend);

        if plan.direction() == ScaleDirection::Identity {
            debug!(page = %page, ?format, "Decoded at natural size, no resample");
            let applied = backend.effective_filter(filter, ScaleDirection::Identity);
            return Ok(DecodedPage::new(key, applied, natural, source));
        }

        let applied = backend.effective_filter(filter, plan.direction());
        let image = backend
            .resample(&source, &plan, applied)
            .map_err(|e| DecodeError::CorruptData(format!("resample failed: {e}")))?;
        // A stale result must not be handed out even if it finished.
        check(cancel)?;

        debug!(
            page = %page,
            %backend,
            filter = %applied,
            from = ?(natural.w, natural.h),
            to = ?(plan.out.w, plan.out.h),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Decoded page"
        );
        Ok(DecodedPage::new(key, applied, natural, image))
    }
}

fn check(cancel: &CancellationToken) -> DecodeResult<()> {
    if cancel.is_cancelled() {
        Err(DecodeError::Cancelled)
    } else {
        Ok(())
    }
}

/// Distinguish unsupported from corrupt where the codec tells us; collapse
/// everything else to corrupt data.
fn map_image_error(err: ImageError) -> DecodeError {
    match err {
        ImageError::Unsupported(e) => DecodeError::UnsupportedFormat(e.to_string()),
        ImageError::Decoding(e) => DecodeError::CorruptData(e.to_string()),
        other => DecodeError::CorruptData(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(w, h, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 90, 255]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    fn decoder() -> PageDecoder {
        PageDecoder::new(Arc::new(SamplerRegistry::probe(&[])))
    }

    fn page() -> PageId {
        PageId::new("book-1", 0)
    }

    #[test]
    fn downscale_fits_the_box_with_lanczos() {
        let out = decoder()
            .decode(
                &page(),
                &png(200, 300),
                Size::new(100, 100),
                SamplerBackend::Native,
                SamplerFilter::Lanczos3,
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(out.size(), Size::new(67, 100));
        assert_eq!(out.natural_size(), Size::new(200, 300));
        assert_eq!(out.filter(), SamplerFilter::Lanczos3);
        assert_eq!(out.byte_size(), 67 * 100 * 4);
        assert_eq!(out.key().target, Size::new(100, 100));
    }

    #[test]
    fn upscale_never_uses_the_downscale_kernel() {
        for backend in SamplerBackend::ALL {
            let out = decoder()
                .decode(
                    &page(),
                    &png(40, 60),
                    Size::new(400, 400),
                    backend,
                    SamplerFilter::Lanczos3,
                    &CancellationToken::new(),
                )
                .unwrap();
            assert_eq!(out.size(), Size::new(267, 400), "{backend}");
            assert_ne!(out.filter(), SamplerFilter::Lanczos3, "{backend}");
        }
    }

    #[test]
    fn natural_size_is_returned_untouched() {
        let bytes = png(50, 80);
        let out = decoder()
            .decode(
                &page(),
                &bytes,
                Size::new(50, 80),
                SamplerBackend::Native,
                SamplerFilter::Lanczos3,
                &CancellationToken::new(),
            )
            .unwrap();
        let original = image::load_from_memory(&bytes).unwrap().into_rgba8();
        assert_eq!(out.pixels(), original.as_raw().as_slice());
    }

    #[test]
    fn same_inputs_give_same_dimensions() {
        let bytes = png(123, 457);
        let run = || {
            decoder()
                .decode(
                    &page(),
                    &bytes,
                    Size::new(90, 90),
                    SamplerBackend::GpuRaster,
                    SamplerFilter::Mitchell,
                    &CancellationToken::new(),
                )
                .unwrap()
        };
        let (a, b) = (run(), run());
        assert_eq!(a.size(), b.size());
        assert_eq!(a.pixels(), b.pixels());
    }

    #[test]
    fn degenerate_inputs_are_rejected() {
        let d = decoder();
        let cancel = CancellationToken::new();
        let err = d
            .decode(&page(), &[], Size::new(10, 10), SamplerBackend::Native, SamplerFilter::Bilinear, &cancel)
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidInput(_)));
        let err = d
            .decode(&page(), &png(4, 4), Size::new(0, 10), SamplerBackend::Native, SamplerFilter::Bilinear, &cancel)
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidInput(_)));
    }

    #[test]
    fn garbage_and_truncated_bytes_are_told_apart() {
        let d = decoder();
        let cancel = CancellationToken::new();
        let err = d
            .decode(&page(), b"definitely not an image", Size::new(10, 10), SamplerBackend::Native, SamplerFilter::Bilinear, &cancel)
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedFormat(_)), "{err:?}");

        let mut truncated = png(64, 64);
        truncated.truncate(60);
        let err = d
            .decode(&page(), &truncated, Size::new(10, 10), SamplerBackend::Native, SamplerFilter::Bilinear, &cancel)
            .unwrap_err();
        assert!(matches!(err, DecodeError::CorruptData(_)), "{err:?}");
    }

    #[test]
    fn cancelled_token_yields_no_bitmap() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = decoder()
            .decode(&page(), &png(8, 8), Size::new(4, 4), SamplerBackend::Native, SamplerFilter::Bilinear, &cancel)
            .unwrap_err();
        assert_eq!(err, DecodeError::Cancelled);
    }

    #[test]
    fn disabled_backend_is_reported() {
        let d = PageDecoder::new(Arc::new(SamplerRegistry::probe(&[SamplerBackend::GpuRaster])));
        let err = d
            .decode(&page(), &png(8, 8), Size::new(4, 4), SamplerBackend::GpuRaster, SamplerFilter::Bilinear, &CancellationToken::new())
            .unwrap_err();
        assert_eq!(err, DecodeError::BackendUnavailable(SamplerBackend::GpuRaster));
    }
}
