//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/rcache/config.toml` (user config)
//! 2. `./rcache.toml` (project-local)
//! 3. CLI arguments (handled externally)

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{ConfigError, RcacheConfig, Result};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "rcache.toml";

/// Default config filename within the user config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for config directory resolution.
const APP_NAME: &str = "rcache";

/// Environment variable to override the user config directory.
const CONFIG_DIR_ENV: &str = "RCACHE_CONFIG_DIR";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file.
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: RcacheConfig,
    /// Sources that were checked, in order of precedence (lowest first).
    pub sources: Vec<ConfigSource>,
}

impl LoadedConfig {
    /// Get paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Load configuration by discovering and merging all config layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Load configuration with explicit control over the user config directory.
///
/// `config_dir` overrides both `RCACHE_CONFIG_DIR` and the platform default.
///
/// Unlike a missing file, a file that exists but does not parse is an error:
/// silently skipping it would run the cache with settings the user did not ask for.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = RcacheConfig::new();
    let mut sources = Vec::new();

    let user_config_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => user_config_path(),
    };
    if let Some(path) = user_config_path {
        sources.push(load_layer(&mut config, &path)?);
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path)?);

    Ok(LoadedConfig { config, sources })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<RcacheConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    RcacheConfig::from_toml(&contents)
}

/// Save configuration to a file.
///
/// Creates parent directories if they don't exist.
pub fn save_config(config: &RcacheConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

/// Get the user config file path for rcache.
pub fn user_config_path() -> Option<PathBuf> {
    user_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// Get the user config directory for rcache.
///
/// Checks `RCACHE_CONFIG_DIR` first, then falls back to the platform default.
pub fn user_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Try to load a config file and merge it into the existing config.
fn load_layer(config: &mut RcacheConfig, path: &Path) -> Result<ConfigSource> {
    if !path.is_file() {
        return Ok(ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        });
    }

    match load_config_file(path) {
        Ok(layer) => {
            debug!(path = %path.display(), "Loaded config layer");
            config.merge(layer);
            Ok(ConfigSource {
                path: path.to_path_buf(),
                loaded: true,
            })
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Rejecting config layer");
            Err(e)
        }
    }
}
