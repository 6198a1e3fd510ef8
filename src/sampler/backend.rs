//! # Backend and Filter Model
//!
//! Three resampling strategies are compiled into every build. They share one
//! contract (RGBA8 bitmap in, RGBA8 bitmap of the planned size out) but differ
//! in quality, speed and the filters they understand:
//!
//! | Backend | Engine | Filters |
//! |---------|--------|---------|
//! | `Native` | fast_image_resize convolution (SIMD) | all six |
//! | `PlatformCodec` | image crate `imageops` | no Mitchell |
//! | `GpuRaster` | fast_image_resize interpolation (texture-style sampling) | no Lanczos3 |
//!
//! `Bicubic` is the Catmull-Rom cubic in both engines. `Lanczos3` is the only
//! kernel reserved for shrinking: when a plan enlarges (or keeps) the image the
//! backend's upscale filter is used instead.

use std::fmt;

use fast_image_resize::Resizer;
use image::RgbaImage;
use page_scale::cpu::{resize_rgba, Kernel, ResampleMode};
use page_scale::presets::{ScaleDirection, ScalePlan};
use serde::{Deserialize, Serialize};

/// One of the compiled-in resampling strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplerBackend {
    /// SIMD convolution resampler; highest quality.
    Native,
    /// The image crate's codec and resampler; always available.
    PlatformCodec,
    /// Fixed-support sampling that mirrors what a GPU texture sampler produces.
    GpuRaster,
}

/// Resampling filter requested by configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplerFilter {
    Nearest,
    Bilinear,
    Bicubic,
    CatmullRom,
    Mitchell,
    Lanczos3,
}

impl SamplerFilter {
    /// Wide kernels that only pay off when shrinking.
    pub fn is_downscale_only(self) -> bool {
        matches!(self, SamplerFilter::Lanczos3)
    }
}

impl fmt::Display for SamplerFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SamplerFilter::Nearest => "nearest",
            SamplerFilter::Bilinear => "bilinear",
            SamplerFilter::Bicubic => "bicubic",
            SamplerFilter::CatmullRom => "catmull-rom",
            SamplerFilter::Mitchell => "mitchell",
            SamplerFilter::Lanczos3 => "lanczos3",
        };
        f.write_str(name)
    }
}

const NATIVE_FILTERS: &[SamplerFilter] = &[
    SamplerFilter::Nearest,
    SamplerFilter::Bilinear,
    SamplerFilter::Bicubic,
    SamplerFilter::CatmullRom,
    SamplerFilter::Mitchell,
    SamplerFilter::Lanczos3,
];

const CODEC_FILTERS: &[SamplerFilter] = &[
    SamplerFilter::Nearest,
    SamplerFilter::Bilinear,
    SamplerFilter::Bicubic,
    SamplerFilter::CatmullRom,
    SamplerFilter::Lanczos3,
];

const RASTER_FILTERS: &[SamplerFilter] = &[
    SamplerFilter::Nearest,
    SamplerFilter::Bilinear,
    SamplerFilter::Bicubic,
    SamplerFilter::CatmullRom,
    SamplerFilter::Mitchell,
];

/// Failure inside a backend's resample step.
#[derive(Debug, thiserror::Error)]
pub enum ResampleError {
    #[error(transparent)]
    Scale(#[from] page_scale::cpu::ScaleError),
    #[error("Resampled buffer does not match {w}x{h}")]
    BufferMismatch { w: u32, h: u32 },
}

impl SamplerBackend {
    /// Every backend compiled into this build, best quality first.
    pub const ALL: [SamplerBackend; 3] = [
        SamplerBackend::Native,
        SamplerBackend::GpuRaster,
        SamplerBackend::PlatformCodec,
    ];

    /// Higher is better. Used to pick the default among available backends.
    pub fn quality_rank(self) -> u8 {
        match self {
            SamplerBackend::Native => 3,
            SamplerBackend::GpuRaster => 2,
            SamplerBackend::PlatformCodec => 1,
        }
    }

    pub fn supported_filters(self) -> &'static [SamplerFilter] {
        match self {
            SamplerBackend::Native => NATIVE_FILTERS,
            SamplerBackend::PlatformCodec => CODEC_FILTERS,
            SamplerBackend::GpuRaster => RASTER_FILTERS,
        }
    }

    pub fn supports(self, filter: SamplerFilter) -> bool {
        self.supported_filters().contains(&filter)
    }

    /// Filter used when shrinking and the requested one is unsupported.
    pub fn downscale_filter(self) -> SamplerFilter {
        match self {
            SamplerBackend::Native | SamplerBackend::PlatformCodec => SamplerFilter::Lanczos3,
            SamplerBackend::GpuRaster => SamplerFilter::Mitchell,
        }
    }

    /// Cheaper filter used whenever the scale factor is >= 1.
    pub fn upscale_filter(self) -> SamplerFilter {
        match self {
            SamplerBackend::Native | SamplerBackend::PlatformCodec => SamplerFilter::Bicubic,
            SamplerBackend::GpuRaster => SamplerFilter::Mitchell,
        }
    }

    /// Resolve the filter actually applied for a plan direction.
    ///
    /// Never returns a downscale-only kernel for an enlarging or identity plan,
    /// and never returns a filter this backend cannot run.
    pub fn effective_filter(self, requested: SamplerFilter, direction: ScaleDirection) -> SamplerFilter {
        let enlarging = direction.is_enlarging_or_identity();
        let filter = if self.supports(requested) {
            requested
        } else if enlarging {
            self.upscale_filter()
        } else {
            self.downscale_filter()
        };
        if enlarging && filter.is_downscale_only() {
            self.upscale_filter()
        } else {
            filter
        }
    }

    /// Resample `src` to `plan.out` with an already resolved filter.
    pub fn resample(
        self,
        src: &RgbaImage,
        plan: &ScalePlan,
        filter: SamplerFilter,
    ) -> Result<RgbaImage, ResampleError> {
        let (w, h) = (plan.out.w, plan.out.h);
        match self {
            SamplerBackend::PlatformCodec => {
                Ok(image::imageops::resize(src, w, h, codec_filter(filter)))
            }
            SamplerBackend::Native | SamplerBackend::GpuRaster => {
                let kernel = fir_kernel(filter);
                let mode = match (self, kernel) {
                    (_, None) => ResampleMode::Nearest,
                    (SamplerBackend::GpuRaster, Some(k)) => ResampleMode::Interpolation(k),
                    (_, Some(k)) => ResampleMode::Convolution(k),
                };
                let mut resizer = Resizer::new();
                let pixels = resize_rgba(&mut resizer, src.as_raw(), plan, mode)?;
                RgbaImage::from_raw(w, h, pixels).ok_or(ResampleError::BufferMismatch { w, h })
            }
        }
    }
}

impl fmt::Display for SamplerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SamplerBackend::Native => "native",
            SamplerBackend::PlatformCodec => "platform-codec",
            SamplerBackend::GpuRaster => "gpu-raster",
        };
        f.write_str(name)
    }
}

/// `None` means nearest-neighbour.
fn fir_kernel(filter: SamplerFilter) -> Option<Kernel> {
    match filter {
        SamplerFilter::Nearest => None,
        SamplerFilter::Bilinear => Some(Kernel::Bilinear),
        SamplerFilter::Bicubic | SamplerFilter::CatmullRom => Some(Kernel::CatmullRom),
        SamplerFilter::Mitchell => Some(Kernel::Mitchell),
        SamplerFilter::Lanczos3 => Some(Kernel::Lanczos3),
    }
}

fn codec_filter(filter: SamplerFilter) -> image::imageops::FilterType {
    use image::imageops::FilterType;
    match filter {
        SamplerFilter::Nearest => FilterType::Nearest,
        SamplerFilter::Bilinear => FilterType::Triangle,
        SamplerFilter::Lanczos3 => FilterType::Lanczos3,
        // Mitchell is not offered by imageops; effective_filter keeps it out.
        SamplerFilter::Bicubic | SamplerFilter::CatmullRom | SamplerFilter::Mitchell => {
            FilterType::CatmullRom
        }
    }
}

/// Named sampler choices exposed to settings and the command line.
///
/// Each preset pins a backend and the filter it uses for shrinking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SamplerPreset {
    /// Native Lanczos3 for shrinking, bicubic for enlarging
    #[clap(name = "native-lanczos")]
    NativeLanczos,
    /// Platform codec with Lanczos3
    #[clap(name = "codec-lanczos")]
    CodecLanczos,
    /// Texture-style Mitchell-Netravali sampling
    #[clap(name = "raster-mitchell")]
    RasterMitchell,
    /// Texture-style Catmull-Rom sampling
    #[clap(name = "raster-catmull-rom")]
    RasterCatmullRom,
    /// Texture-style nearest neighbour, for pixel art and debugging
    #[clap(name = "raster-nearest")]
    RasterNearest,
}

impl SamplerPreset {
    pub fn backend(self) -> SamplerBackend {
        match self {
            SamplerPreset::NativeLanczos => SamplerBackend::Native,
            SamplerPreset::CodecLanczos => SamplerBackend::PlatformCodec,
            SamplerPreset::RasterMitchell
            | SamplerPreset::RasterCatmullRom
            | SamplerPreset::RasterNearest => SamplerBackend::GpuRaster,
        }
    }

    pub fn filter(self) -> SamplerFilter {
        match self {
            SamplerPreset::NativeLanczos | SamplerPreset::CodecLanczos => SamplerFilter::Lanczos3,
            SamplerPreset::RasterMitchell => SamplerFilter::Mitchell,
            SamplerPreset::RasterCatmullRom => SamplerFilter::CatmullRom,
            SamplerPreset::RasterNearest => SamplerFilter::Nearest,
        }
    }
}
