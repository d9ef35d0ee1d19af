//! CLI command handlers.

pub mod clear;
pub mod config;
pub mod keys;
pub mod refresh;
pub mod show;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use rcache_config::CacheSettings;
use rcache_store::ResourceCache;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Explicit config file; bypasses discovery.
    pub config_file: Option<PathBuf>,
}

impl Context {
    /// Resolve cache settings from the explicit file or the discovered layers.
    pub fn settings(&self) -> Result<CacheSettings> {
        let config = match &self.config_file {
            Some(path) => rcache_config::load_config_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => rcache_config::load_config(None)?.config,
        };
        Ok(config.settings()?)
    }

    /// Open the resource cache and read its snapshot.
    pub fn open_loaded(&self) -> Result<ResourceCache> {
        let mut cache = ResourceCache::open(self.settings()?)?;
        cache
            .load()
            .context("Failed to read the cache snapshot; run 'rcache refresh' to rebuild it")?;
        Ok(cache)
    }

    /// Print a value as pretty JSON.
    pub fn print_json<T: serde::Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}
