//! Error types for cache operations.

use std::path::{Path, PathBuf};

/// Error type for cache operations.
///
/// A cache miss is not an error; lookups return `Option`. Undecodable source
/// images are substituted, not reported. What remains are conditions the
/// caller has to see.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Snapshot exists but cannot be read back as a snapshot.
    #[error("snapshot {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// Filesystem failure (missing directory, permissions, disk full).
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to encode a snapshot payload.
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] bincode::Error),

    /// Failed to encode or decode an image artifact.
    #[error("image error for '{name}': {source}")]
    Image {
        name: String,
        #[source]
        source: image::ImageError,
    },

    /// Pixel buffer does not match its declared dimensions.
    #[error("pixel buffer of {len} bytes does not fit {width}x{height} RGBA")]
    InvalidBuffer { width: u32, height: u32, len: usize },

    /// The render function behind a slug lookup failed.
    #[error("render failed for '{fingerprint}': {source}")]
    Render {
        fingerprint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration could not be applied.
    #[error(transparent)]
    Config(#[from] rcache_config::ConfigError),
}

impl CacheError {
    /// Whether this error is a recoverable snapshot corruption.
    pub fn is_corruption(&self) -> bool {
        matches!(self, CacheError::Corrupt { .. })
    }

    pub(crate) fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        CacheError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Adapter for `map_err` on I/O results that attaches the path.
pub(crate) fn io_at(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
