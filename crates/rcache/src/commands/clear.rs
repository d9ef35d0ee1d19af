//! Clear command - empty the resource and slug caches.

use anyhow::Result;
use clap::Args;
use rcache_store::{ImageSlugCache, ResourceCache};
use serde_json::json;

use super::Context;

/// Arguments for the clear command.
#[derive(Args, Debug)]
pub struct ClearArgs {
    /// Also delete snapshots and rendered slug files
    #[arg(long)]
    pub persistent: bool,
}

/// Run the clear command.
pub fn run(args: ClearArgs, ctx: &Context) -> Result<()> {
    let settings = ctx.settings()?;
    let mut slugs = ImageSlugCache::from_settings(&settings)?;
    let mut cache = ResourceCache::open(settings)?;

    cache.clear(args.persistent)?;
    slugs.clear(args.persistent)?;

    if ctx.json_output {
        return ctx.print_json(&json!({
            "cleared": true,
            "persistent": args.persistent,
            "snapshot": cache.snapshot_path(),
        }));
    }
    if args.persistent {
        println!("Cleared cache and removed {}", cache.snapshot_path().display());
    } else {
        println!("Cleared in-memory cache; snapshot kept");
    }
    Ok(())
}
