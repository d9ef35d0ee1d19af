//! Filesystem layout derived from [`CacheSettings`].
//!
//! The cache directory is a staging area for incoming source images, the
//! error directory collects copies of sources that failed to decode.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{CacheSettings, ConfigError, Result};

impl CacheSettings {
    /// Effective slug output directory.
    pub fn effective_slug_dir(&self) -> &Path {
        self.slug_dir.as_deref().unwrap_or(&self.cache_dir)
    }

    /// Ensure the cache and error directories exist.
    ///
    /// With `reload`, the cache directory is removed first so the staging
    /// area starts empty. Returns the cache directory.
    pub fn prepare(&self, reload: bool) -> Result<PathBuf> {
        if reload && self.cache_dir.exists() {
            debug!(path = %self.cache_dir.display(), "Wiping cache directory");
            std::fs::remove_dir_all(&self.cache_dir).map_err(|e| prepare_err(&self.cache_dir, e))?;
        }

        for dir in [&self.cache_dir, &self.error_dir] {
            std::fs::create_dir_all(dir).map_err(|e| prepare_err(dir, e))?;
        }

        Ok(self.cache_dir.clone())
    }
}

fn prepare_err(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::PrepareDir {
        path: path.display().to_string(),
        source,
    }
}
