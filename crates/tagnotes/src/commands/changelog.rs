//! Changelog command: render the notes for the current build.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use tracing::{debug, instrument};

use tagnotes_core::snapshot::read_snapshot;
use tagnotes_core::{ChangelogRequest, Config, OutputFormat, build_changelog};

/// Arguments for the `changelog` subcommand.
#[derive(Args, Debug, Default)]
pub struct ChangelogArgs {
    /// Build variant (default: the snapshot's variant, else the most recent tag)
    #[arg(long, value_name = "VARIANT")]
    pub variant: Option<String>,

    /// Read the current tag from this snapshot instead of querying tags
    #[arg(long, value_name = "FILE")]
    pub snapshot: Option<Utf8PathBuf>,

    /// Output format (`--json` implies `json`)
    #[arg(short, long, value_enum, default_value_t)]
    pub format: OutputFormat,

    /// Write to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<Utf8PathBuf>,
}

/// Build and render the changelog.
#[instrument(name = "cmd_changelog", skip_all, fields(variant = ?args.variant, format = ?args.format))]
pub fn cmd_changelog(
    args: ChangelogArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    let snapshot = match args.snapshot {
        Some(ref path) => {
            let path = cwd.join(path);
            let tag = read_snapshot(&path).context("cannot use the build tag snapshot")?;
            debug!(tag = %tag.name, "pinned by snapshot");
            Some(tag)
        }
        None => None,
    };

    let variant = args
        .variant
        .clone()
        .or_else(|| snapshot.as_ref().map(|t| t.build_variant.clone()));
    let settings = config
        .changelog_settings(variant.as_deref())
        .context("invalid changelog settings")?;

    let git = super::open_repo(cwd)?;
    let request = ChangelogRequest {
        variant,
        variants: config.variants.clone(),
        snapshot,
    };
    let changelog = build_changelog(&git, &settings, &request)?;

    let format = if global_json {
        OutputFormat::Json
    } else {
        args.format
    };
    let rendered = changelog.render(format, &settings)?;

    let output = args.output.map(|p| cwd.join(p));
    super::emit(&rendered, output.as_deref())
}
