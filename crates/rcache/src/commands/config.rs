//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Args, Subcommand};
use rcache_config::RcacheConfig;
use serde_json::json;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show resolved settings and which files they came from
    Show,

    /// Show the user configuration file path
    Path,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./rcache.toml) instead of user config
        #[arg(long)]
        local: bool,
    },
}

/// Run the config command.
pub fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Path => cmd_path(ctx),
        ConfigCommand::Init { local } => cmd_init(local, ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let sources: Vec<PathBuf> = match &ctx.config_file {
        Some(path) => vec![path.clone()],
        None => rcache_config::load_config(None)?
            .loaded_from()
            .into_iter()
            .map(PathBuf::from)
            .collect(),
    };
    let settings = ctx.settings()?;

    if ctx.json_output {
        return ctx.print_json(&json!({ "sources": sources, "settings": settings }));
    }

    println!("# rcache Configuration\n");

    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    println!("Cache:");
    println!("  cache_dir:     {}", settings.cache_dir.display());
    println!("  error_dir:     {}", settings.error_dir.display());
    println!("  slug_dir:      {}", settings.effective_slug_dir().display());
    println!("  cache_max:     {}", settings.cache_max);
    println!("  preload:       {}", settings.preload);
    println!("  debug_images:  {}", settings.debug_images);
    println!("  purge_startup: {}", settings.purge_cache_on_startup);
    match &settings.error_image {
        Some(path) => println!("  error_image:   {}", path.display()),
        None => println!("  error_image:   (built-in)"),
    }

    if ctx.verbose {
        println!("\n---\nRaw config:\n");
        let mut raw = RcacheConfig::new();
        raw.merge(RcacheConfig::with_defaults());
        if let Some(path) = &ctx.config_file {
            raw.merge(rcache_config::load_config_file(path)?);
        } else {
            raw.merge(rcache_config::load_config(None)?.config);
        }
        println!("{}", raw.to_toml()?);
    }

    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    let path = rcache_config::user_config_path()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?;
    if ctx.json_output {
        return ctx.print_json(&json!({ "path": path, "exists": path.is_file() }));
    }
    println!("{}", path.display());
    Ok(())
}

fn cmd_init(local: bool, ctx: &Context) -> Result<()> {
    let path = if local {
        PathBuf::from("rcache.toml")
    } else {
        rcache_config::user_config_path()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    rcache_config::save_config(&RcacheConfig::with_defaults(), &path)?;

    if ctx.json_output {
        return ctx.print_json(&json!({ "created": path }));
    }
    println!("Created config file: {}", path.display());
    Ok(())
}
