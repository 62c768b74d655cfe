//! xdbi-json-merge
//!
//! Three-way merge of JSON documents: `original`, `ours`, `theirs`.
//! Prints the merged document to stdout (or overwrites `ours` with
//! `--in-place`) and exits non-zero if any conflict node remains.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use xdbi::merge::three_way_merge;

#[derive(Parser, Debug)]
#[command(author, version, about = "Three-way JSON merge")]
struct Args {
    /// The common ancestor document.
    original: PathBuf,

    /// Our modified document.
    ours: PathBuf,

    /// Their modified document.
    theirs: PathBuf,

    /// Overwrite `ours` with the merge result instead of printing to stdout.
    #[arg(long)]
    in_place: bool,
}

fn read_json(path: &PathBuf) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {} as JSON", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let original = read_json(&args.original)?;
    let ours = read_json(&args.ours)?;
    let theirs = read_json(&args.theirs)?;

    let (has_conflict, merged) = three_way_merge(&original, &ours, &theirs);
    let rendered = serde_json::to_string_pretty(&merged)?;

    if args.in_place {
        std::fs::write(&args.ours, &rendered).with_context(|| format!("writing {}", args.ours.display()))?;
    } else {
        println!("{rendered}");
    }

    if has_conflict {
        eprintln!("merge produced one or more conflict nodes");
        std::process::exit(1);
    }
    Ok(())
}
