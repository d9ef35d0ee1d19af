//! Show and export commands - inspect a single entry.

use std::path::PathBuf;

use anyhow::{Result, anyhow, bail};
use clap::Args;
use serde_json::json;

use super::Context;

/// Arguments for the show command.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Cache key (file name without extension)
    pub key: String,
}

/// Arguments for the export command.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Cache key (file name without extension)
    pub key: String,

    /// Output PNG path
    pub out: PathBuf,
}

/// Run the show command.
pub fn run(args: ShowArgs, ctx: &Context) -> Result<()> {
    let cache = ctx.open_loaded()?;
    let Some(entry) = cache.peek(&args.key) else {
        bail!("No cache entry for key '{}'", args.key);
    };
    let dims = entry.body.as_ref().map(|b| b.dimensions());

    if ctx.json_output {
        return ctx.print_json(&json!({
            "key": args.key,
            "filename": entry.filename,
            "loaded": dims.is_some(),
            "width": dims.map(|d| d.0),
            "height": dims.map(|d| d.1),
        }));
    }

    println!("key:      {}", args.key);
    println!("filename: {}", entry.filename);
    match dims {
        Some((w, h)) => println!("size:     {w}x{h}"),
        None => println!("size:     not loaded"),
    }
    Ok(())
}

/// Run the export command.
pub fn run_export(args: ExportArgs, ctx: &Context) -> Result<()> {
    let mut cache = ctx.open_loaded()?;
    let entry = cache
        .resolve(&args.key)?
        .ok_or_else(|| anyhow!("No cache entry for key '{}'", args.key))?;
    let body = entry
        .body
        .as_ref()
        .ok_or_else(|| anyhow!("Entry '{}' has no image data", args.key))?;

    std::fs::write(&args.out, body.encode_png()?)?;

    if ctx.json_output {
        return ctx.print_json(&json!({ "key": args.key, "path": args.out }));
    }
    println!("Wrote {} to {}", args.key, args.out.display());
    Ok(())
}
