// SPDX-License-Identifier: MIT
// CPU resampler built on fast_image_resize (SIMD-accelerated).
// RGBA8 in, RGBA8 out, tightly packed rows on both sides.

use fast_image_resize as fir;
use fir::images::{TypedImage, TypedImageRef};
use fir::pixels::U8x4;
use fir::{FilterType, ResizeAlg, ResizeOptions, Resizer};

use crate::presets::ScalePlan;

#[derive(Debug, thiserror::Error)]
pub enum ScaleError {
    #[error("Source buffer has {actual} bytes, expected {expected}")]
    SourceLength { expected: usize, actual: usize },
    #[error("Plan has an empty input or output size")]
    EmptyPlan,
    #[error("Fast image resize error: {0}")]
    Fir(#[from] fir::ResizeError),
    #[error("Image buffer error: {0}")]
    ImageBuf(#[from] fir::ImageBufferError),
}

/// Resampling kernels shared by the convolution and interpolation modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kernel {
    Bilinear,
    CatmullRom,
    Mitchell,
    Lanczos3,
}

impl Kernel {
    fn filter_type(self) -> FilterType {
        match self {
            Kernel::Bilinear => FilterType::Bilinear,
            Kernel::CatmullRom => FilterType::CatmullRom,
            Kernel::Mitchell => FilterType::Mitchell,
            Kernel::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// How source pixels are combined into each destination pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResampleMode {
    /// Pick the closest source pixel.
    Nearest,
    /// Kernel support grows with the downscale ratio (area-aware, highest quality).
    Convolution(Kernel),
    /// Fixed kernel support, like sampling a texture on the GPU without mipmaps.
    Interpolation(Kernel),
}

impl ResampleMode {
    fn resize_alg(self) -> ResizeAlg {
        match self {
            ResampleMode::Nearest => ResizeAlg::Nearest,
            ResampleMode::Convolution(k) => ResizeAlg::Convolution(k.filter_type()),
            ResampleMode::Interpolation(k) => ResizeAlg::Interpolation(k.filter_type()),
        }
    }
}

/// Main resampling entry point.
/// `src_rgba` must be exactly `plan.input.w * plan.input.h * 4` bytes.
/// Returns a freshly allocated `plan.out.w * plan.out.h * 4` byte buffer.
pub fn resize_rgba(
    resizer: &mut Resizer,
    src_rgba: &[u8],
    plan: &ScalePlan,
    mode: ResampleMode,
) -> Result<Vec<u8>, ScaleError> {
    if plan.input.is_empty() || plan.out.is_empty() {
        return Err(ScaleError::EmptyPlan);
    }
    let expected = plan.input.rgba_len();
    if src_rgba.len() != expected {
        return Err(ScaleError::SourceLength {
            expected,
            actual: src_rgba.len(),
        });
    }

    let src_view = TypedImageRef::<U8x4>::from_buffer(plan.input.w, plan.input.h, src_rgba)?;

    let mut dst = vec![0u8; plan.out.rgba_len()];
    {
        let mut dst_image = TypedImage::<U8x4>::from_buffer(plan.out.w, plan.out.h, dst.as_mut_slice())?;
        // Nearest copies pixels verbatim, premultiplying would only cost time.
        let opts = ResizeOptions::new()
            .resize_alg(mode.resize_alg())
            .use_alpha(!matches!(mode, ResampleMode::Nearest));
        resizer.resize_typed::<U8x4>(&src_view, &mut dst_image, &opts)?;
    }

    Ok(dst)
}
