//! Backend registry: which samplers can run in this process.
//!
//! The registry is built once at startup by probing each compiled-in backend
//! with a tiny resample. A failed probe marks the backend unavailable; it never
//! fails the registry. The platform codec is always kept, so the available set
//! is never empty. After construction the registry is read-only.

use image::{Rgba, RgbaImage};
use page_scale::presets::{build_plan, Size};
use tracing::{debug, info, warn};

use super::backend::{SamplerBackend, SamplerFilter};

/// Probe outcome for one backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendStatus {
    pub backend: SamplerBackend,
    pub available: bool,
    /// Why the backend is unavailable, if it is.
    pub reason: Option<String>,
}

#[derive(Clone, Debug)]
pub struct SamplerRegistry {
    /// Ordered best quality first.
    statuses: Vec<BackendStatus>,
}

impl SamplerRegistry {
    /// The backend that must work everywhere.
    pub const FALLBACK: SamplerBackend = SamplerBackend::PlatformCodec;

    /// Probe every backend, skipping the ones named in `disabled`.
    pub fn probe(disabled: &[SamplerBackend]) -> Self {
        let statuses = SamplerBackend::ALL
            .iter()
            .map(|&backend| {
                let outcome = if backend == Self::FALLBACK {
                    if disabled.contains(&backend) {
                        warn!(%backend, "Fallback backend cannot be disabled; keeping it");
                    }
                    Ok(())
                } else if disabled.contains(&backend) {
                    Err("disabled by configuration".to_string())
                } else {
                    probe_backend(backend)
                };
                match outcome {
                    Ok(()) => {
                        debug!(%backend, "Sampler backend available");
                        BackendStatus {
                            backend,
                            available: true,
                            reason: None,
                        }
                    }
                    Err(reason) => {
                        info!(%backend, %reason, "Sampler backend unavailable");
                        BackendStatus {
                            backend,
                            available: false,
                            reason: Some(reason),
                        }
                    }
                }
            })
            .collect();
        Self { statuses }
    }

    /// Build a registry from known statuses (tests and embedders that probe
    /// elsewhere). The fallback is forced available.
    pub fn from_statuses(mut statuses: Vec<BackendStatus>) -> Self {
        match statuses.iter_mut().find(|s| s.backend == Self::FALLBACK) {
            Some(status) => {
                status.available = true;
                status.reason = None;
            }
            None => statuses.push(BackendStatus {
                backend: Self::FALLBACK,
                available: true,
                reason: None,
            }),
        }
        statuses.sort_by_key(|s| std::cmp::Reverse(s.backend.quality_rank()));
        Self { statuses }
    }

    pub fn statuses(&self) -> &[BackendStatus] {
        &self.statuses
    }

    pub fn available_backends(&self) -> Vec<SamplerBackend> {
        self.statuses
            .iter()
            .filter(|s| s.available)
            .map(|s| s.backend)
            .collect()
    }

    pub fn is_available(&self, backend: SamplerBackend) -> bool {
        self.statuses
            .iter()
            .any(|s| s.backend == backend && s.available)
    }

    /// Highest quality available backend.
    pub fn default_backend(&self) -> SamplerBackend {
        self.statuses
            .iter()
            .find(|s| s.available)
            .map(|s| s.backend)
            .unwrap_or(Self::FALLBACK)
    }

    pub fn fallback_backend(&self) -> SamplerBackend {
        Self::FALLBACK
    }

    /// Map a configured backend to one that can run here.
    pub fn resolve(&self, requested: SamplerBackend) -> SamplerBackend {
        if self.is_available(requested) {
            return requested;
        }
        let chosen = self.default_backend();
        warn!(
            requested = %requested,
            chosen = %chosen,
            "Configured sampler backend unavailable, falling back"
        );
        chosen
    }
}

/// Run a 4x4 -> 2x2 resample through the backend.
fn probe_backend(backend: SamplerBackend) -> Result<(), String> {
    if cfg!(target_arch = "wasm32") && backend == SamplerBackend::GpuRaster {
        return Err("no GPU rasterizer on wasm32".to_string());
    }
    let src = RgbaImage::from_pixel(4, 4, Rgba([128, 128, 128, 255]));
    let plan = build_plan(Size::new(4, 4), Size::new(2, 2));
    let filter = backend.effective_filter(SamplerFilter::Bilinear, plan.direction());
    let out = backend
        .resample(&src, &plan, filter)
        .map_err(|e| format!("probe resample failed: {e}"))?;
    if out.dimensions() != (2, 2) {
        return Err(format!("probe produced {:?}", out.dimensions()));
    }
    Ok(())
}
