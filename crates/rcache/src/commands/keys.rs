//! Keys command - list cache contents.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::Context;

/// Arguments for the keys command.
#[derive(Args, Debug)]
pub struct KeysArgs {
    /// Include file name and size for each key
    #[arg(short, long)]
    pub long: bool,
}

#[derive(Serialize)]
struct KeyRow {
    key: String,
    filename: String,
    width: Option<u32>,
    height: Option<u32>,
}

/// Run the keys command.
pub fn run(args: KeysArgs, ctx: &Context) -> Result<()> {
    let cache = ctx.open_loaded()?;

    let rows: Vec<KeyRow> = cache
        .keys()
        .into_iter()
        .filter_map(|key| {
            let entry = cache.peek(&key)?;
            let dims = entry.body.as_ref().map(|b| b.dimensions());
            Some(KeyRow {
                filename: entry.filename.clone(),
                width: dims.map(|d| d.0),
                height: dims.map(|d| d.1),
                key,
            })
        })
        .collect();

    if ctx.json_output {
        return ctx.print_json(&rows);
    }

    for row in &rows {
        if args.long {
            let size = match (row.width, row.height) {
                (Some(w), Some(h)) => format!("{w}x{h}"),
                _ => "not loaded".to_string(),
            };
            println!("{:<24} {:<32} {}", row.key, row.filename, size);
        } else {
            println!("{}", row.key);
        }
    }
    Ok(())
}
