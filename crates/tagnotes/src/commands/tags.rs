//! Tags command: show the build tag range a changelog would cover.

use anyhow::Context;
use camino::Utf8Path;
use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, instrument};

use tagnotes_core::{BuildTag, CommitRange, Config, TagRange, TagRangeResolver};

/// Arguments for the `tags` subcommand.
#[derive(Args, Debug, Default)]
pub struct TagsArgs {
    /// Build variant (default: most recent tag across configured variants)
    #[arg(long, value_name = "VARIANT")]
    pub variant: Option<String>,
}

#[derive(Serialize)]
struct TagsReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    variant: Option<String>,
    current: Option<BuildTag>,
    previous: Option<BuildTag>,
    range: CommitRange,
}

impl TagsReport {
    fn new(variant: Option<String>, range: Option<TagRange>) -> Self {
        match range {
            Some(range) => Self {
                variant,
                range: range.as_commit_range(),
                current: Some(range.current),
                previous: range.previous,
            },
            None => Self {
                variant,
                current: None,
                previous: None,
                range: CommitRange::full_history("HEAD"),
            },
        }
    }
}

/// Resolve and print the tag range.
#[instrument(name = "cmd_tags", skip_all, fields(variant = ?args.variant))]
pub fn cmd_tags(
    args: TagsArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    let git = super::open_repo(cwd)?;
    let pattern = config.tag_pattern()?;
    let resolver = TagRangeResolver::new(&git, &pattern);

    let range = match args.variant {
        Some(ref variant) => resolver
            .find_tag_range(variant)
            .with_context(|| format!("failed to resolve tag range for `{variant}`"))?,
        None => match resolver.find_recent_build_tag(&config.variants)? {
            Some(recent) => Some(resolver.find_tag_range_from(&recent)?),
            None => None,
        },
    };
    debug!(found = range.is_some(), "tag range");

    let report = TagsReport::new(args.variant, range);
    if global_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let Some(ref current) = report.current else {
        let scope = report.variant.as_deref().unwrap_or("any variant");
        println!(
            "{} {}",
            "No build tags for".yellow(),
            scope.yellow().bold()
        );
        println!("{}", "The changelog covers the full history.".dimmed());
        return Ok(());
    };

    println!(
        "{}: {} {}",
        "Current".dimmed(),
        current.name.green().bold(),
        short_sha(&current.commit_sha).dimmed()
    );
    match report.previous {
        Some(ref previous) => println!(
            "{}: {} {}",
            "Previous".dimmed(),
            previous.name.cyan(),
            short_sha(&previous.commit_sha).dimmed()
        ),
        None => println!("{}: {}", "Previous".dimmed(), "none (first build)".yellow()),
    }
    println!("{}: {}", "Range".dimmed(), report.range);
    Ok(())
}

fn short_sha(sha: &str) -> &str {
    sha.get(..12).unwrap_or(sha)
}
