//! Configuration for the rcache image cache.
//!
//! Provides a typed TOML schema with:
//! - A `[cache]` table whose keys each have a declared type and default
//! - Config file layering (user config dir + project-local override)
//! - Environment preparation (cache and diagnostics directories)
//!
//! Unknown keys and mistyped values are rejected instead of guessed at.

pub mod discovery;
pub mod error;
pub mod paths;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, save_config,
    user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::{
    CacheLayer, CacheSettings, DEFAULT_CACHE_DIR, DEFAULT_CACHE_MAX, DEFAULT_ERROR_DIR,
    RcacheConfig,
};
