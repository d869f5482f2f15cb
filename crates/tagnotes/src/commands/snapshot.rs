//! Snapshot command: pin the current build tag for later tasks.

use anyhow::{Context, bail};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{info, instrument};

use tagnotes_core::snapshot::write_snapshot;
use tagnotes_core::{BuildTag, Config, TagRangeResolver};

/// Arguments for the `snapshot` subcommand.
#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// Build variant whose current tag is pinned
    #[arg(long, value_name = "VARIANT")]
    pub variant: String,

    /// Snapshot file (default: `snapshot_path` from config, else build/tag-snapshot.json)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<Utf8PathBuf>,
}

#[derive(Serialize)]
struct SnapshotReport<'a> {
    path: &'a Utf8Path,
    tag: &'a BuildTag,
}

/// Resolve the current tag for the variant and write it to the snapshot file.
#[instrument(name = "cmd_snapshot", skip_all, fields(variant = %args.variant))]
pub fn cmd_snapshot(
    args: SnapshotArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    let git = super::open_repo(cwd)?;
    let pattern = config.tag_pattern()?;

    let Some(range) = TagRangeResolver::new(&git, &pattern)
        .find_tag_range(&args.variant)
        .with_context(|| format!("failed to resolve build tag for `{}`", args.variant))?
    else {
        bail!("no build tags for variant `{}`; nothing to snapshot", args.variant);
    };

    let path = args
        .output
        .unwrap_or_else(|| config.snapshot_path().to_path_buf());
    let path = if path.is_absolute() { path } else { cwd.join(path) };

    write_snapshot(&path, &range.current)?;
    info!(tag = %range.current.name, %path, "snapshot written");

    if global_json {
        let report = SnapshotReport {
            path: &path,
            tag: &range.current,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} {} {} {}",
            "Pinned".green(),
            range.current.name.bold(),
            "to".dimmed(),
            path.cyan()
        );
    }
    Ok(())
}
