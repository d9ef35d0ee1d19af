//! Refresh command - import staged images and persist the cache.

use anyhow::Result;
use clap::Args;
use rcache_store::{RefreshReport, ResourceCache};

use super::Context;

/// Arguments for the refresh command.
#[derive(Args, Debug)]
pub struct RefreshArgs {
    /// Write the snapshot even if nothing new was imported
    #[arg(long)]
    pub resave: bool,

    /// Empty the cache directory before refreshing (discards staged images)
    #[arg(long)]
    pub reload: bool,
}

/// Run the refresh command.
pub fn run(args: RefreshArgs, ctx: &Context) -> Result<()> {
    let settings = ctx.settings()?;
    if args.reload {
        settings.prepare(true)?;
    }

    let mut cache = ResourceCache::open(settings)?;
    let report = cache.refresh(args.resave)?;

    if ctx.json_output {
        return ctx.print_json(&report);
    }
    print_report(&report, &cache, ctx.verbose);
    Ok(())
}

fn print_report(report: &RefreshReport, cache: &ResourceCache, verbose: bool) {
    if report.purged {
        println!("Purged previous snapshot");
    }
    if report.rebuilt {
        println!("Snapshot was damaged; rebuilt from the cache directory");
    }
    println!(
        "Imported {} image(s), {} substituted, {} evicted",
        report.ingested, report.substituted, report.evicted
    );
    if report.saved {
        println!("Saved {} entries to {}", report.entries, cache.snapshot_path().display());
    } else {
        println!("{} entries, snapshot unchanged", report.entries);
    }
    if verbose && report.removed_sources > 0 {
        println!("Removed {} source file(s)", report.removed_sources);
    }
}
