//! # Error Types for the Page Pipeline
//!
//! Errors in the reader pipeline are local by construction: a page that fails
//! to fetch or decode becomes an inline error placeholder in its spread slot,
//! and nothing here is allowed to abort the reading session.
//!
//! ## Taxonomy
//!
//! - [`DecodeError`]: the decoder could not produce a bitmap (bad input,
//!   unsupported or corrupt data, unusable backend, cancelled)
//! - [`FetchError`]: the byte provider failed; carried opaquely
//! - [`PageError`]: what a page slot shows when it fails (fetch or decode)
//! - [`ZoomError`]: gesture intake rejected a caller contract violation
//! - [`ConfigError`]: a configuration snapshot failed validation
//!
//! ## Classification
//!
//! Every error reports a stable [`category`](PageError::category) string for
//! logging, and implements [`Retryable`] so callers can decide whether a
//! later reload has any chance of fixing the page.

use std::sync::Arc;

use thiserror::Error;

use crate::sampler::SamplerBackend;

/// Failures produced by the page decoder.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Caller contract violation: empty bytes, zero-sized target, etc.
    #[error("Invalid decode input: {0}")]
    InvalidInput(String),
    /// The bytes are in a format no codec in this build understands.
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),
    /// The bytes claim a known format but cannot be decoded.
    #[error("Corrupt image data: {0}")]
    CorruptData(String),
    /// The selected backend cannot run on this platform/build.
    #[error("Sampler backend {0} is not available")]
    BackendUnavailable(SamplerBackend),
    /// The decode was abandoned because its target became stale.
    #[error("Decode cancelled")]
    Cancelled,
}

impl DecodeError {
    /// Get the error category as a string
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::CorruptData(_) => "corrupt_data",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Opaque failure reported by the byte provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Fetch failed: {message}")]
pub struct FetchError {
    pub message: String,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The error a page slot renders as its placeholder.
///
/// Cloneable so every requester coalesced onto one decode sees the same value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The decode worker went away without reporting (panic or runtime shutdown).
    #[error("Decode worker stopped: {0}")]
    Worker(Arc<str>),
}

impl PageError {
    /// Get the error category as a string
    pub fn category(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Decode(e) => e.category(),
            Self::Worker(_) => "worker",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Decode(DecodeError::Cancelled))
    }
}

/// Rejected zoom/pan input.
#[derive(Debug, Error)]
pub enum ZoomError {
    #[error("Invalid zoom input: {0}")]
    InvalidInput(String),
    /// The engine was built from a viewport configuration that fails validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A configuration snapshot that failed validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error in '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("Configuration could not be parsed: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Trait for errors that a later attempt might not reproduce
pub trait Retryable {
    /// Check if this error can be retried
    fn is_retryable(&self) -> bool;
}

impl Retryable for DecodeError {
    fn is_retryable(&self) -> bool {
        // Server content may be replaced; a re-fetch can turn corrupt bytes good.
        matches!(self, Self::CorruptData(_) | Self::Cancelled)
    }
}

impl Retryable for PageError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(_) | Self::Worker(_) => true,
            Self::Decode(e) => e.is_retryable(),
        }
    }
}

/// Result type alias for decoder operations
pub type DecodeResult<T> = Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_stable() {
        assert_eq!(PageError::from(FetchError::new("timeout")).category(), "fetch");
        assert_eq!(
            PageError::from(DecodeError::CorruptData("bad huffman".into())).category(),
            "corrupt_data"
        );
        assert_eq!(DecodeError::Cancelled.category(), "cancelled");
    }

    #[test]
    fn invalid_input_is_not_retryable() {
        assert!(!DecodeError::InvalidInput("zero width".into()).is_retryable());
        assert!(PageError::from(FetchError::new("503")).is_retryable());
        assert!(PageError::from(DecodeError::CorruptData("eof".into())).is_retryable());
    }

    #[test]
    fn display_includes_detail() {
        let err = ConfigError::invalid("cache.budget_bytes", "must be greater than 0");
        assert_eq!(
            err.to_string(),
            "Configuration error in 'cache.budget_bytes': must be greater than 0"
        );
    }
}
