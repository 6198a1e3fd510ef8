//! # Reader Configuration
//!
//! One [`ReaderConfig`] snapshot configures every stage of the pipeline. All
//! fields have defaults, so a JSON snapshot only needs the keys it changes.
//!
//! ## Parameters
//!
//! | Section | Field | Default | Constraint |
//! |---------|-------|---------|------------|
//! | `decode` | `preset` | `native-lanczos` | |
//! | `decode` | `disabled_backends` | `[]` | must not contain `platform-codec` |
//! | `cache` | `budget_bytes` | 256 MiB | > 0 |
//! | `spread` | `layout` | `single-page` | |
//! | `spread` | `direction` | `left-to-right` | |
//! | `spread` | `wide_page_ratio` | 1.0 | > 0 |
//! | `spread` | `auto_single_on_portrait` | true | |
//! | `viewport` | `min_scale` / `max_scale` | 0.5 / 5.0 | 0 < min <= 1 <= max |
//! | `viewport` | `min_visible_fraction` | 1.0 | in (0, 1] |
//! | `viewport` | `scroll_zoom_base` | 1.2 | > 1 |
//! | `viewport` | `scroll_pan_step` | 50.0 | >= 0 |
//! | `reload` | `debounce_ms` | 1000 | > 0 |
//! | `reload` | `cooldown_ms` | 2500 | > `debounce_ms` |
//!
//! ## Examples
//!
//! ```rust
//! use manga_page_pipeline::config::ReaderConfig;
//!
//! let config = ReaderConfig::from_json_str(r#"{ "cache": { "budget_bytes": 1048576 } }"#).unwrap();
//! assert_eq!(config.cache.budget_bytes, 1 << 20);
//! assert_eq!(config.reload.debounce_ms, 1000);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::layout::{PageLayout, ReadingDirection};
use crate::sampler::{SamplerBackend, SamplerFilter, SamplerPreset, SamplerRegistry};

/// Complete pipeline configuration snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub decode: DecodeConfig,
    pub cache: CacheConfig,
    pub spread: SpreadConfig,
    pub viewport: ViewportConfig,
    pub reload: ReloadConfig,
}

/// Sampler selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    pub preset: SamplerPreset,
    /// Backends never to probe or use.
    pub disabled_backends: Vec<SamplerBackend>,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            preset: SamplerPreset::NativeLanczos,
            disabled_backends: Vec::new(),
        }
    }
}

impl DecodeConfig {
    pub fn backend(&self) -> SamplerBackend {
        self.preset.backend()
    }

    pub fn filter(&self) -> SamplerFilter {
        self.preset.filter()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Byte budget for decoded bitmaps.
    pub budget_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            budget_bytes: 256 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpreadConfig {
    pub layout: PageLayout,
    pub direction: ReadingDirection,
    /// Pages with width/height above this are never paired.
    pub wide_page_ratio: f64,
    /// Show single pages when the container is taller than wide.
    pub auto_single_on_portrait: bool,
}

impl Default for SpreadConfig {
    fn default() -> Self {
        Self {
            layout: PageLayout::SinglePage,
            direction: ReadingDirection::LeftToRight,
            wide_page_ratio: 1.0,
            auto_single_on_portrait: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub min_scale: f64,
    pub max_scale: f64,
    /// Share of the content that must stay inside the container when it is
    /// smaller than the container.
    pub min_visible_fraction: f64,
    /// Wheel zoom factor per notch is `scroll_zoom_base ^ -delta`.
    pub scroll_zoom_base: f64,
    /// Pixels panned per wheel notch without the zoom modifier.
    pub scroll_pan_step: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.5,
            max_scale: 5.0,
            min_visible_fraction: 1.0,
            scroll_zoom_base: 1.2,
            scroll_pan_step: 50.0,
        }
    }
}

impl ViewportConfig {
    /// Validates the scale range and gesture parameters.
    ///
    /// `min_scale <= 1 <= max_scale`, so the range is never inverted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_scale > 0.0 && self.min_scale <= 1.0) {
            return Err(ConfigError::invalid("viewport.min_scale", "must be in (0, 1]"));
        }
        if !(self.max_scale.is_finite() && self.max_scale >= 1.0) {
            return Err(ConfigError::invalid("viewport.max_scale", "must be finite and at least 1"));
        }
        if !(self.min_visible_fraction > 0.0 && self.min_visible_fraction <= 1.0) {
            return Err(ConfigError::invalid("viewport.min_visible_fraction", "must be in (0, 1]"));
        }
        if !(self.scroll_zoom_base.is_finite() && self.scroll_zoom_base > 1.0) {
            return Err(ConfigError::invalid("viewport.scroll_zoom_base", "must be greater than 1"));
        }
        if !(self.scroll_pan_step.is_finite() && self.scroll_pan_step >= 0.0) {
            return Err(ConfigError::invalid("viewport.scroll_pan_step", "must not be negative"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    pub debounce_ms: u64,
    /// Minimum interval between two reloads of the same key.
    pub cooldown_ms: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            cooldown_ms: 2500,
        }
    }
}

impl ReloadConfig {
    pub fn new(debounce: Duration, cooldown: Duration) -> Self {
        Self {
            debounce_ms: debounce.as_millis() as u64,
            cooldown_ms: cooldown.as_millis() as u64,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl ReaderConfig {
    /// Parse and validate a JSON snapshot.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: ReaderConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .decode
            .disabled_backends
            .contains(&SamplerRegistry::FALLBACK)
        {
            return Err(ConfigError::invalid(
                "decode.disabled_backends",
                "the platform-codec fallback cannot be disabled",
            ));
        }
        if self.cache.budget_bytes == 0 {
            return Err(ConfigError::invalid("cache.budget_bytes", "must be greater than 0"));
        }
        if !(self.spread.wide_page_ratio.is_finite() && self.spread.wide_page_ratio > 0.0) {
            return Err(ConfigError::invalid("spread.wide_page_ratio", "must be greater than 0"));
        }
        self.viewport.validate()?;
        if self.reload.debounce_ms == 0 {
            return Err(ConfigError::invalid("reload.debounce_ms", "must be greater than 0"));
        }
        if self.reload.cooldown_ms <= self.reload.debounce_ms {
            return Err(ConfigError::invalid(
                "reload.cooldown_ms",
                format!("must be longer than the {} ms debounce window", self.reload.debounce_ms),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReaderConfig::default();
        assert_eq!(config.decode.backend(), SamplerBackend::Native);
        assert_eq!(config.decode.filter(), SamplerFilter::Lanczos3);
        assert_eq!(config.cache.budget_bytes, 256 * 1024 * 1024);
        assert_eq!(config.reload.debounce(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ReaderConfig::default();

        config.cache.budget_bytes = 0;
        assert!(config.validate().is_err());
        config.cache.budget_bytes = 1024;

        config.viewport.min_scale = 1.5;
        assert!(config.validate().is_err());
        config.viewport.min_scale = 0.5;

        config.viewport.min_scale = 3.0;
        config.viewport.max_scale = 2.0;
        assert!(config.viewport.validate().is_err());
        assert!(config.validate().is_err());
        config.viewport.min_scale = 0.5;
        config.viewport.max_scale = 5.0;

        config.viewport.min_visible_fraction = 0.0;
        assert!(config.validate().is_err());
        config.viewport.min_visible_fraction = 0.25;

        config.reload.cooldown_ms = config.reload.debounce_ms;
        assert!(config.validate().is_err());
        config.reload.cooldown_ms = 3000;

        config.decode.disabled_backends = vec![SamplerBackend::PlatformCodec];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("decode.disabled_backends"));
        config.decode.disabled_backends = vec![SamplerBackend::GpuRaster];

        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_snapshot_uses_kebab_case_names() {
        let config = ReaderConfig::from_json_str(
            r#"{
                "decode": { "preset": "raster-mitchell", "disabled_backends": ["native"] },
                "spread": { "layout": "double-pages", "direction": "right-to-left" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.decode.backend(), SamplerBackend::GpuRaster);
        assert_eq!(config.spread.layout, PageLayout::DoublePages);
        assert_eq!(config.spread.direction, ReadingDirection::RightToLeft);
        assert_eq!(config.spread.wide_page_ratio, 1.0);

        let back = ReaderConfig::from_json_str(&config.to_json_string().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            ReaderConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
