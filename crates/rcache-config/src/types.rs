//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [cache]
//! cache_dir = ".imgcache"
//! error_dir = "rcache_errors"
//! cache_max = 1000
//! debug_images = false
//! preload = true
//! purge_cache_on_startup = false
//! # error_image = "assets/err.png"
//! # slug_dir = ".slugcache"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Default staging directory for source images.
pub const DEFAULT_CACHE_DIR: &str = ".imgcache";

/// Default diagnostics directory for images that failed to decode.
pub const DEFAULT_ERROR_DIR: &str = "rcache_errors";

/// Default cache capacity (number of entries).
pub const DEFAULT_CACHE_MAX: usize = 1000;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// Every section is optional so partial configs (e.g. a project-local override
/// that only changes `cache_max`) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RcacheConfig {
    /// The `[cache]` table.
    pub cache: Option<CacheLayer>,
}

impl RcacheConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority per key).
    pub fn merge(&mut self, other: RcacheConfig) {
        if let Some(layer) = other.cache {
            match self.cache.as_mut() {
                Some(base) => base.merge(layer),
                None => self.cache = Some(layer),
            }
        }
    }

    /// Resolve the layered config into concrete, validated settings.
    pub fn settings(&self) -> Result<CacheSettings> {
        self.cache.clone().unwrap_or_default().resolve()
    }

    /// A config with every key spelled out at its default value.
    pub fn with_defaults() -> Self {
        let defaults = CacheSettings::default();
        Self {
            cache: Some(CacheLayer {
                cache_dir: Some(defaults.cache_dir),
                error_dir: Some(defaults.error_dir),
                cache_max: Some(defaults.cache_max),
                debug_images: Some(defaults.debug_images),
                preload: Some(defaults.preload),
                purge_cache_on_startup: Some(defaults.purge_cache_on_startup),
                error_image: None,
                slug_dir: None,
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cache Layer
// ─────────────────────────────────────────────────────────────────────────────

/// One layer of the `[cache]` table as written in a file.
///
/// Absent keys fall through to lower layers and finally to the defaults in
/// [`CacheSettings`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheLayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_max: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_images: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preload: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purge_cache_on_startup: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_image: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug_dir: Option<PathBuf>,
}

impl CacheLayer {
    /// Overlay `other` onto this layer; keys set in `other` win.
    pub fn merge(&mut self, other: CacheLayer) {
        fn overlay<T>(base: &mut Option<T>, top: Option<T>) {
            if top.is_some() {
                *base = top;
            }
        }

        overlay(&mut self.cache_dir, other.cache_dir);
        overlay(&mut self.error_dir, other.error_dir);
        overlay(&mut self.cache_max, other.cache_max);
        overlay(&mut self.debug_images, other.debug_images);
        overlay(&mut self.preload, other.preload);
        overlay(&mut self.purge_cache_on_startup, other.purge_cache_on_startup);
        overlay(&mut self.error_image, other.error_image);
        overlay(&mut self.slug_dir, other.slug_dir);
    }

    /// Fill in defaults and validate.
    pub fn resolve(self) -> Result<CacheSettings> {
        let defaults = CacheSettings::default();
        let settings = CacheSettings {
            cache_dir: self.cache_dir.unwrap_or(defaults.cache_dir),
            error_dir: self.error_dir.unwrap_or(defaults.error_dir),
            cache_max: self.cache_max.unwrap_or(defaults.cache_max),
            debug_images: self.debug_images.unwrap_or(defaults.debug_images),
            preload: self.preload.unwrap_or(defaults.preload),
            purge_cache_on_startup: self
                .purge_cache_on_startup
                .unwrap_or(defaults.purge_cache_on_startup),
            error_image: self.error_image,
            slug_dir: self.slug_dir,
        };
        settings.validate()?;
        Ok(settings)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolved Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Fully resolved cache settings handed to the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Staging directory scanned for new source images.
    pub cache_dir: PathBuf,

    /// Diagnostics directory receiving copies of undecodable sources.
    pub error_dir: PathBuf,

    /// Maximum number of entries kept before LRU eviction.
    pub cache_max: usize,

    /// Keep source files after ingestion and capture undecodable ones.
    pub debug_images: bool,

    /// Decode sources during refresh instead of storing placeholders.
    pub preload: bool,

    /// Delete the snapshot before the first load, forcing a rebuild.
    pub purge_cache_on_startup: bool,

    /// Image substituted for sources that fail to decode.
    /// `None` uses the built-in fallback.
    pub error_image: Option<PathBuf>,

    /// Directory for slug cache outputs. `None` means `cache_dir`.
    pub slug_dir: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            error_dir: PathBuf::from(DEFAULT_ERROR_DIR),
            cache_max: DEFAULT_CACHE_MAX,
            debug_images: false,
            preload: true,
            purge_cache_on_startup: false,
            error_image: None,
            slug_dir: None,
        }
    }
}

impl CacheSettings {
    /// Settings rooted at `cache_dir`, with the diagnostics directory next to it.
    pub fn in_dir(cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        let error_dir = cache_dir
            .parent()
            .map(|p| p.join(DEFAULT_ERROR_DIR))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ERROR_DIR));
        Self {
            cache_dir,
            error_dir,
            ..Self::default()
        }
    }

    /// Set the cache capacity.
    pub fn with_cache_max(mut self, max: usize) -> Self {
        self.cache_max = max;
        self
    }

    /// Enable or disable debug image handling.
    pub fn with_debug_images(mut self, enabled: bool) -> Self {
        self.debug_images = enabled;
        self
    }

    /// Enable or disable eager decoding during refresh.
    pub fn with_preload(mut self, enabled: bool) -> Self {
        self.preload = enabled;
        self
    }

    /// Enable or disable snapshot purge on first refresh.
    pub fn with_purge_on_startup(mut self, enabled: bool) -> Self {
        self.purge_cache_on_startup = enabled;
        self
    }

    /// Set the fallback image path.
    pub fn with_error_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_image = Some(path.into());
        self
    }

    /// Set the diagnostics directory.
    pub fn with_error_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_dir = path.into();
        self
    }

    /// Set the slug output directory.
    pub fn with_slug_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.slug_dir = Some(path.into());
        self
    }

    /// Check invariants that the type system cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "cache_dir".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.error_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "error_dir".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.cache_dir == self.error_dir {
            return Err(ConfigError::Invalid {
                field: "error_dir".to_string(),
                reason: "must differ from cache_dir".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RcacheConfig::from_toml("").unwrap();
        assert!(config.cache.is_none());

        let settings = config.settings().unwrap();
        assert_eq!(settings, CacheSettings::default());
        assert_eq!(settings.cache_max, DEFAULT_CACHE_MAX);
        assert!(settings.preload);
        assert!(!settings.debug_images);
    }

    #[test]
    fn test_parse_full_table() {
        let toml = r#"
[cache]
cache_dir = "/tmp/imgs"
error_dir = "/tmp/errs"
cache_max = 25
debug_images = true
preload = false
purge_cache_on_startup = true
error_image = "/opt/err.png"
slug_dir = "/tmp/slugs"
"#;
        let settings = RcacheConfig::from_toml(toml).unwrap().settings().unwrap();
        assert_eq!(settings.cache_dir, PathBuf::from("/tmp/imgs"));
        assert_eq!(settings.error_dir, PathBuf::from("/tmp/errs"));
        assert_eq!(settings.cache_max, 25);
        assert!(settings.debug_images);
        assert!(!settings.preload);
        assert!(settings.purge_cache_on_startup);
        assert_eq!(settings.error_image, Some(PathBuf::from("/opt/err.png")));
        assert_eq!(settings.slug_dir, Some(PathBuf::from("/tmp/slugs")));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let toml = r#"
[cache]
cache_maximum = 10
"#;
        assert!(matches!(
            RcacheConfig::from_toml(toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_unknown_section_is_rejected() {
        assert!(RcacheConfig::from_toml("[server]\nport = 1\n").is_err());
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        // A string where an integer is declared must not be coerced.
        let toml = r#"
[cache]
cache_max = "10"
"#;
        assert!(RcacheConfig::from_toml(toml).is_err());

        let toml = r#"
[cache]
debug_images = "True"
"#;
        assert!(RcacheConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_negative_capacity_is_rejected() {
        assert!(RcacheConfig::from_toml("[cache]\ncache_max = -1\n").is_err());
    }

    #[test]
    fn test_same_dirs_invalid() {
        let toml = r#"
[cache]
cache_dir = "same"
error_dir = "same"
"#;
        let config = RcacheConfig::from_toml(toml).unwrap();
        assert!(matches!(
            config.settings(),
            Err(ConfigError::Invalid { field, .. }) if field == "error_dir"
        ));
    }

    #[test]
    fn test_merge_overrides_per_key() {
        let mut base = RcacheConfig::from_toml(
            r#"
[cache]
cache_dir = "base"
cache_max = 5
"#,
        )
        .unwrap();
        let over = RcacheConfig::from_toml("[cache]\ncache_max = 50\n").unwrap();

        base.merge(over);
        let settings = base.settings().unwrap();
        assert_eq!(settings.cache_dir, PathBuf::from("base"));
        assert_eq!(settings.cache_max, 50);
    }

    #[test]
    fn test_merge_into_empty() {
        let mut base = RcacheConfig::new();
        base.merge(RcacheConfig::from_toml("[cache]\npreload = false\n").unwrap());
        assert!(!base.settings().unwrap().preload);
    }

    #[test]
    fn test_defaults_roundtrip_through_toml() {
        let config = RcacheConfig::with_defaults();
        let text = config.to_toml().unwrap();
        assert!(text.contains("cache_max = 1000"));
        let parsed = RcacheConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.settings().unwrap(), CacheSettings::default());
    }

    #[test]
    fn test_in_dir_places_error_dir_alongside() {
        let settings = CacheSettings::in_dir("/data/.imgcache");
        assert_eq!(settings.cache_dir, PathBuf::from("/data/.imgcache"));
        assert_eq!(settings.error_dir, PathBuf::from("/data/rcache_errors"));
        settings.validate().unwrap();
    }
}
