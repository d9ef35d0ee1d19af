//! rcache - image resource cache
//!
//! Main entry point for the rcache CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{clear, config, keys, refresh, show};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// rcache - image resource cache with LRU eviction and snapshot persistence
#[derive(Parser)]
#[command(name = "rcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Use this config file instead of discovering one
    #[arg(long, global = true, env = "RCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import new images from the cache directory and update the snapshot
    Refresh(refresh::RefreshArgs),

    /// List cached keys, least recently used first
    Keys(keys::KeysArgs),

    /// Show one cache entry
    Show(show::ShowArgs),

    /// Write a cached image out as PNG
    Export(show::ExportArgs),

    /// Empty the cache
    Clear(clear::ClearArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays parseable
    let filter = if cli.verbose {
        "rcache=debug,rcache_store=debug,rcache_config=debug,info"
    } else {
        "rcache=info,rcache_store=info,rcache_config=warn,warn"
    };

    use tracing_subscriber::prelude::*;
    let console = if cli.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };
    tracing_subscriber::registry()
        .with(console.with_filter(tracing_subscriber::EnvFilter::new(filter)))
        .init();

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        config_file: cli.config,
    };

    match cli.command {
        Commands::Refresh(args) => refresh::run(args, &ctx),
        Commands::Keys(args) => keys::run(args, &ctx),
        Commands::Show(args) => show::run(args, &ctx),
        Commands::Export(args) => show::run_export(args, &ctx),
        Commands::Clear(args) => clear::run(args, &ctx),
        Commands::Config(args) => config::run(args, &ctx),
    }
}
