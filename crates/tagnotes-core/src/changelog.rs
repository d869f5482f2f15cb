//! The changelog pipeline: resolve → extract → filter → reference → render.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::commits::{self, CommitExtractor, DEFAULT_REVERT_MARKER};
use crate::git::{GitError, VcsExecutor};
use crate::references::{self, ReferenceError, ReferencePattern, ReferenceScan};
use crate::render::{self, ChangelogEntry, ChatLimits, EscapeRules};
use crate::resolve::{CommitRange, ResolveError, TagRange, TagRangeResolver};
use crate::snapshot::SnapshotError;
use crate::tag::{BuildTag, TagError, TagPattern};

/// Errors building or rendering a changelog.
#[derive(Error, Debug)]
pub enum ChangelogError {
    /// Tag discovery failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Reading commit subjects failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// A tag name did not fit the pattern.
    #[error(transparent)]
    Tag(#[from] TagError),

    /// The snapshot could not be read.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The reference pattern is invalid.
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    /// The snapshot pins a tag for another variant than the one requested.
    #[error("snapshot tag {tag} belongs to variant `{snapshot}`, not `{requested}`")]
    VariantMismatch {
        /// Pinned tag name.
        tag: String,
        /// Variant of the pinned tag.
        snapshot: String,
        /// Variant asked for.
        requested: String,
    },

    /// Serializing the chat payload or the changelog failed.
    #[error("failed to encode changelog as JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for pipeline operations.
pub type ChangelogResult<T> = Result<T, ChangelogError>;

/// Output formats for [`Changelog::render`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One subject per line.
    #[default]
    Plain,
    /// Bulleted Markdown with issue links.
    Markdown,
    /// Chat block payload (JSON).
    Chat,
    /// Escaped bulleted markup.
    Markup,
    /// The full changelog as JSON.
    Json,
}

/// Settings for one variant's changelog, resolved from configuration.
#[derive(Debug, Clone)]
pub struct ChangelogSettings {
    /// Build tag naming convention.
    pub tag_pattern: TagPattern,
    /// Only subjects containing this key are kept.
    pub message_key: Option<String>,
    /// Remove the key from kept subjects.
    pub strip_message_key: bool,
    /// Subjects starting with this are reverts; empty disables the check.
    pub revert_marker: String,
    /// Issue key pattern; `None` skips reference scanning.
    pub reference_pattern: Option<ReferencePattern>,
    /// Link target prefix for Markdown references.
    pub issue_url_prefix: Option<String>,
    /// Caps for the chat payload.
    pub limits: ChatLimits,
    /// Escaping for markup output.
    pub escape_rules: EscapeRules,
}

impl Default for ChangelogSettings {
    fn default() -> Self {
        Self {
            tag_pattern: TagPattern::default(),
            message_key: None,
            strip_message_key: true,
            revert_marker: DEFAULT_REVERT_MARKER.to_string(),
            reference_pattern: None,
            issue_url_prefix: None,
            limits: ChatLimits::default(),
            escape_rules: EscapeRules::telegram_markdown_v2(),
        }
    }
}

/// What to build a changelog for.
#[derive(Debug, Clone, Default)]
pub struct ChangelogRequest {
    /// Resolve the range for this variant.
    pub variant: Option<String>,
    /// Without a variant, the most recent tag across these variants is used.
    pub variants: Vec<String>,
    /// Pinned current tag, typically read from a snapshot.
    pub snapshot: Option<BuildTag>,
}

/// A resolved, filtered changelog.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Changelog {
    /// Tag the changelog ends at; `None` before the first release.
    pub current: Option<BuildTag>,
    /// Tag the changelog starts after.
    pub previous: Option<BuildTag>,
    /// Commit range the entries were read from.
    pub range: CommitRange,
    /// Entries, newest first.
    pub entries: Vec<ChangelogEntry>,
    /// Reference scan result, `null` in JSON when unconfigured.
    pub references: ReferenceScan,
}

impl Changelog {
    /// True when no commit made it through the filters.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render in `format`.
    pub fn render(&self, format: OutputFormat, settings: &ChangelogSettings) -> ChangelogResult<String> {
        let out = match format {
            OutputFormat::Plain => render::render_plain_text(&self.entries),
            OutputFormat::Markdown => {
                render::render_markdown(&self.entries, settings.issue_url_prefix.as_deref())
            }
            OutputFormat::Markup => render::render_markup(&self.entries, &settings.escape_rules),
            OutputFormat::Chat => {
                let mut payload = render::render_chat_blocks(&self.entries, settings.limits);
                if let Some(ref current) = self.current {
                    payload = payload.with_header(current.name.clone());
                }
                serde_json::to_string_pretty(&payload)?
            }
            OutputFormat::Json => serde_json::to_string_pretty(self)?,
        };
        Ok(out)
    }
}

/// Build the changelog for `request`.
///
/// With no build tag at all the range is the full history up to `HEAD`.
#[instrument(skip_all, fields(variant = ?request.variant, pinned = request.snapshot.is_some()))]
pub fn build_changelog<E: VcsExecutor + ?Sized>(
    executor: &E,
    settings: &ChangelogSettings,
    request: &ChangelogRequest,
) -> ChangelogResult<Changelog> {
    let tags = resolve_range(executor, &settings.tag_pattern, request)?;
    let range = tags
        .as_ref()
        .map_or_else(|| CommitRange::full_history("HEAD"), TagRange::as_commit_range);

    let subjects = CommitExtractor::new(executor)
        .with_revert_marker(settings.revert_marker.as_str())
        .extract_subjects(&range)?;
    let key = settings.message_key.as_deref().filter(|k| !k.is_empty());
    let mut subjects = commits::filter_by_key(subjects, key);
    if let Some(key) = key
        && settings.strip_message_key
    {
        subjects = subjects.iter().map(|s| commits::strip_key(s, key)).collect();
    }
    let subjects = commits::dedup(subjects);

    let scan = ReferenceScan::scan(&subjects, settings.reference_pattern.as_ref());
    let entries = match scan.references() {
        Some(refs) => references::annotate(&subjects, refs),
        None => subjects.into_iter().map(ChangelogEntry::new).collect(),
    };

    info!(range = %range, entries = entries.len(), "changelog built");
    let (current, previous) = match tags {
        Some(TagRange { current, previous }) => (Some(current), previous),
        None => (None, None),
    };
    Ok(Changelog {
        current,
        previous,
        range,
        entries,
        references: scan,
    })
}

fn resolve_range<E: VcsExecutor + ?Sized>(
    executor: &E,
    pattern: &TagPattern,
    request: &ChangelogRequest,
) -> ChangelogResult<Option<TagRange>> {
    let resolver = TagRangeResolver::new(executor, pattern);

    if let Some(ref pinned) = request.snapshot {
        if let Some(ref requested) = request.variant
            && *requested != pinned.build_variant
        {
            return Err(ChangelogError::VariantMismatch {
                tag: pinned.name.clone(),
                snapshot: pinned.build_variant.clone(),
                requested: requested.clone(),
            });
        }
        debug!(tag = %pinned.name, "using pinned tag");
        return Ok(Some(resolver.find_tag_range_from(pinned)?));
    }

    if let Some(ref variant) = request.variant {
        return Ok(resolver.find_tag_range(variant)?);
    }

    match resolver.find_recent_build_tag(&request.variants)? {
        Some(recent) => Ok(Some(resolver.find_tag_range_from(&recent)?)),
        None => Ok(None),
    }
}
