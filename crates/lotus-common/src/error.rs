//! Error types for LOTUS import
//!
//! Every failure carries an [`ErrorKind`] so callers can decide what to do
//! with it (retry, absorb per record, or abort the run) without matching on
//! individual variants.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for LOTUS operations
pub type Result<T> = std::result::Result<T, LotusError>;

/// Coarse classification of a [`LotusError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient transport failure, including per-call timeouts
    Network,
    /// The remote service declares the resource absent
    NotFound,
    /// The remote service kept throttling us
    RateLimitExceeded,
    /// The remote service rejected the request for good
    Remote,
    /// A candidate record is missing mandatory data
    Validation,
    /// More than one remote entity carries the same natural key
    AmbiguousMatch,
    /// A batch lookup chunk failed after retries
    ResolutionFailed,
    /// A local path cannot be read or written
    AccessDenied,
    /// Local I/O failure
    Io,
    /// Malformed input or response payload
    Parse,
    /// Invalid configuration
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::NotFound => "not_found",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::Remote => "remote",
            Self::Validation => "validation",
            Self::AmbiguousMatch => "ambiguous_match",
            Self::ResolutionFailed => "resolution_failed",
            Self::AccessDenied => "access_denied",
            Self::Io => "io",
            Self::Parse => "parse",
            Self::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for LOTUS import
#[derive(Error, Debug)]
pub enum LotusError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Remote rejected request (status {status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Validation failed for '{key}': {message}")]
    Validation { key: String, message: String },

    #[error("Ambiguous match for '{key}': {} remote entities ({})", candidates.len(), candidates.join(", "))]
    AmbiguousMatch { key: String, candidates: Vec<String> },

    #[error("Resolution of {property} failed: {source}")]
    ResolutionFailed {
        property: String,
        #[source]
        source: Box<LotusError>,
    },

    #[error("Access denied for '{}': {reason}", path.display())]
    AccessDenied { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TSV error: {0}")]
    Tsv(#[from] csv::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LotusError {
    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a validation error for one candidate
    pub fn validation(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an access denied error
    pub fn access_denied(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::AccessDenied {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a chunk failure into a resolution failure for `property`
    pub fn resolution_failed(property: impl Into<String>, source: LotusError) -> Self {
        Self::ResolutionFailed {
            property: property.into(),
            source: Box::new(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) | Self::Timeout(_) => ErrorKind::Network,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::RateLimitExceeded(_) => ErrorKind::RateLimitExceeded,
            Self::Remote { .. } => ErrorKind::Remote,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::AmbiguousMatch { .. } => ErrorKind::AmbiguousMatch,
            Self::ResolutionFailed { .. } => ErrorKind::ResolutionFailed,
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::Io(_) => ErrorKind::Io,
            Self::Serialization(_) | Self::Tsv(_) | Self::Parse(_) => ErrorKind::Parse,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether the failure only concerns the record being processed.
    ///
    /// The publish pipeline counts these and moves on; everything else aborts
    /// the run.
    pub fn is_record_level(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation | ErrorKind::AmbiguousMatch)
    }
}

/// Anything that can tell a retry policy what kind of failure it is.
pub trait Classify {
    fn error_kind(&self) -> ErrorKind;
}

impl Classify for LotusError {
    fn error_kind(&self) -> ErrorKind {
        self.kind()
    }
}
