//! Tag range resolution.
//!
//! Finds the build tags bounding the unreleased commits of a variant. Tags
//! are taken in VCS creation order, newest first. Build numbers are never
//! compared as strings: `app/9` sorts after `app/10` lexically, which is
//! exactly the bug this module exists to avoid.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::git::{GitError, RawTag, VcsExecutor};
use crate::tag::{BuildTag, TagError, TagPattern};

/// Errors from tag range resolution.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The tag query failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// A returned tag does not fit the naming convention.
    #[error(transparent)]
    Tag(#[from] TagError),
}

/// Result alias for resolver operations.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Commit endpoints for changelog extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRange {
    /// Exclusive lower bound; `None` means the start of history.
    pub from_sha: Option<String>,
    /// Inclusive upper bound.
    pub to_sha: String,
}

impl CommitRange {
    /// Everything reachable from `to`.
    pub fn full_history(to: impl Into<String>) -> Self {
        Self {
            from_sha: None,
            to_sha: to.into(),
        }
    }

    /// Whether the range starts at the root of history.
    pub const fn is_full_history(&self) -> bool {
        self.from_sha.is_none()
    }
}

impl std::fmt::Display for CommitRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.from_sha {
            Some(ref from) => write!(f, "{from}..{}", self.to_sha),
            None => write!(f, "(root)..{}", self.to_sha),
        }
    }
}

/// The newest build tag of a variant and the one before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagRange {
    /// The newest build tag.
    pub current: BuildTag,
    /// The previous build tag; `None` for a variant's first build.
    pub previous: Option<BuildTag>,
}

impl TagRange {
    /// The commits introduced by `current`.
    pub fn as_commit_range(&self) -> CommitRange {
        CommitRange {
            from_sha: self.previous.as_ref().map(|t| t.commit_sha.clone()),
            to_sha: self.current.commit_sha.clone(),
        }
    }
}

/// Resolves build tag pairs through a [`VcsExecutor`].
pub struct TagRangeResolver<'a, E: VcsExecutor + ?Sized> {
    executor: &'a E,
    pattern: &'a TagPattern,
}

impl<'a, E: VcsExecutor + ?Sized> TagRangeResolver<'a, E> {
    /// Create a resolver for tags named by `pattern`.
    pub const fn new(executor: &'a E, pattern: &'a TagPattern) -> Self {
        Self { executor, pattern }
    }

    /// Find the two most recent build tags of `variant`.
    ///
    /// Returns `Ok(None)` when the variant has no tags yet: the first
    /// release, whose changelog is the full history.
    #[instrument(skip(self))]
    pub fn find_tag_range(&self, variant: &str) -> ResolveResult<Option<TagRange>> {
        let scoped = self.pattern.for_variant(variant)?;
        let Some(raw) = self.executor.find_build_tags(&scoped.globs(), Some(2))? else {
            debug!(%variant, "no build tags");
            return Ok(None);
        };

        let mut tags = parse_all(&scoped, raw)?;
        prefer_higher_build_on_same_commit(&mut tags);

        let mut tags = tags.into_iter();
        let Some(current) = tags.next() else {
            return Ok(None);
        };
        let range = TagRange {
            current,
            previous: tags.next(),
        };
        debug!(
            current = %range.current.name,
            previous = ?range.previous.as_ref().map(|t| &t.name),
            "tag range resolved"
        );
        Ok(Some(range))
    }

    /// Find the most recent build tag across `variants`.
    ///
    /// With no variants, every tag matching the pattern is considered.
    #[instrument(skip(self))]
    pub fn find_recent_build_tag(&self, variants: &[String]) -> ResolveResult<Option<BuildTag>> {
        let scoped: Vec<TagPattern> = variants
            .iter()
            .map(|v| self.pattern.for_variant(v))
            .collect::<Result<_, _>>()?;

        let globs: Vec<String> = if scoped.is_empty() {
            self.pattern.globs()
        } else {
            scoped.iter().flat_map(TagPattern::globs).collect()
        };

        let Some(raw) = self.executor.find_build_tags(&globs, Some(2))? else {
            debug!("no build tags for any variant");
            return Ok(None);
        };

        let mut tags = raw
            .into_iter()
            .map(|tag| self.parse_any(&scoped, tag))
            .collect::<ResolveResult<Vec<_>>>()?;
        prefer_higher_build_on_same_commit(&mut tags);

        let recent = tags.into_iter().next();
        debug!(tag = ?recent.as_ref().map(|t| &t.name), "most recent build tag");
        Ok(recent)
    }

    /// Resolve the range ending at a known tag, typically a snapshot.
    ///
    /// The previous tag is the newest tag of the same variant, in creation
    /// order, with a lower build number than `current`. A lower build created
    /// after `current` on the same commit still counts.
    #[instrument(skip(self, current), fields(current = %current.name))]
    pub fn find_tag_range_from(&self, current: &BuildTag) -> ResolveResult<TagRange> {
        let scoped = self.pattern.for_variant(&current.build_variant)?;
        let tags = match self.executor.find_build_tags(&scoped.globs(), None)? {
            Some(raw) => parse_all(&scoped, raw)?,
            None => Vec::new(),
        };

        let previous = tags
            .into_iter()
            .find(|t| t.name != current.name && t.build_number < current.build_number);

        debug!(previous = ?previous.as_ref().map(|t| &t.name), "previous tag resolved");
        Ok(TagRange {
            current: current.clone(),
            previous,
        })
    }

    /// Parse with the first variant-scoped pattern that accepts the tag.
    fn parse_any(&self, scoped: &[TagPattern], tag: RawTag) -> ResolveResult<BuildTag> {
        if scoped.is_empty() {
            return self
                .pattern
                .parse_tag(tag.name, tag.commit_sha, tag.message)
                .map_err(ResolveError::from);
        }

        match scoped.iter().find(|p| p.matches(&tag.name)) {
            Some(pattern) => pattern
                .parse_tag(tag.name, tag.commit_sha, tag.message)
                .map_err(ResolveError::from),
            None => Err(TagError::Malformed {
                name: tag.name,
                pattern: self.pattern.as_str().to_string(),
            }
            .into()),
        }
    }
}

fn parse_all(pattern: &TagPattern, raw: Vec<RawTag>) -> ResolveResult<Vec<BuildTag>> {
    raw.into_iter()
        .map(|t| pattern.parse_tag(t.name, t.commit_sha, t.message))
        .collect::<Result<Vec<_>, _>>()
        .map_err(ResolveError::from)
}

/// Two tags on one commit: the higher build number is the newer release.
fn prefer_higher_build_on_same_commit(tags: &mut [BuildTag]) {
    let swap = matches!(
        tags,
        [first, second, ..]
            if first.commit_sha == second.commit_sha && second.build_number > first.build_number
    );
    if swap {
        tags.swap(0, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::fake::FakeGit;

    fn pattern() -> TagPattern {
        TagPattern::default()
    }

    #[test]
    fn no_tags_yields_none() {
        let mut git = FakeGit::new();
        git.commit("initial");
        let pattern = pattern();
        let resolver = TagRangeResolver::new(&git, &pattern);

        assert_eq!(resolver.find_tag_range("app").unwrap(), None);
        let range = CommitRange::full_history("HEAD");
        assert!(range.is_full_history());
        assert_eq!(range.from_sha, None);
    }

    #[test]
    fn two_tags_give_current_and_previous() {
        let mut git = FakeGit::new();
        let a = git.commit("first");
        git.tag("app/12", &a);
        let b = git.commit("second");
        git.tag("app/13", &b);

        let pattern = pattern();
        let range = TagRangeResolver::new(&git, &pattern)
            .find_tag_range("app")
            .unwrap()
            .unwrap();

        assert_eq!(range.current.name, "app/13");
        assert_eq!(range.previous.as_ref().unwrap().name, "app/12");
        assert_eq!(
            range.as_commit_range(),
            CommitRange {
                from_sha: Some(a),
                to_sha: b,
            }
        );
    }

    #[test]
    fn requests_at_most_two_tags_for_variant() {
        let mut git = FakeGit::new();
        let a = git.commit("first");
        git.tag("app/1", &a);
        let pattern = pattern();
        TagRangeResolver::new(&git, &pattern)
            .find_tag_range("app")
            .unwrap();

        let queries = git.queries.borrow();
        assert_eq!(queries[0], (vec!["app/*".to_string()], Some(2)));
    }

    #[test]
    fn single_tag_is_bootstrap() {
        let mut git = FakeGit::new();
        let a = git.commit("first");
        git.tag("app/1", &a);
        let pattern = pattern();
        let range = TagRangeResolver::new(&git, &pattern)
            .find_tag_range("app")
            .unwrap()
            .unwrap();

        assert!(range.previous.is_none());
        assert!(range.as_commit_range().is_full_history());
    }

    #[test]
    fn creation_order_beats_lexical_order() {
        let mut git = FakeGit::new();
        let a = git.commit("first");
        git.tag("app/9", &a);
        let b = git.commit("second");
        git.tag("app/10", &b);

        let pattern = pattern();
        let range = TagRangeResolver::new(&git, &pattern)
            .find_tag_range("app")
            .unwrap()
            .unwrap();
        assert_eq!(range.current.build_number, 10);
        assert_eq!(range.previous.unwrap().build_number, 9);
    }

    #[test]
    fn same_commit_prefers_higher_build_number() {
        let mut git = FakeGit::new();
        let a = git.commit("first");
        // Created in the "wrong" order on the same commit.
        git.tag("app/8", &a);
        git.tag("app/7", &a);

        let pattern = pattern();
        let range = TagRangeResolver::new(&git, &pattern)
            .find_tag_range("app")
            .unwrap()
            .unwrap();
        assert_eq!(range.current.name, "app/8");
        assert_eq!(range.previous.unwrap().name, "app/7");
    }

    #[test]
    fn variants_are_independent() {
        let mut git = FakeGit::new();
        let a = git.commit("first");
        git.tag("app/3", &a);
        let b = git.commit("second");
        git.tag("beta/40", &b);

        let pattern = pattern();
        let range = TagRangeResolver::new(&git, &pattern)
            .find_tag_range("app")
            .unwrap()
            .unwrap();
        assert_eq!(range.current.name, "app/3");
        assert!(range.previous.is_none());
    }

    #[test]
    fn malformed_tag_surfaces() {
        let mut git = FakeGit::new();
        let a = git.commit("first");
        git.tag("app/latest", &a);

        let pattern = pattern();
        let result = TagRangeResolver::new(&git, &pattern).find_tag_range("app");
        assert!(matches!(
            result,
            Err(ResolveError::Tag(TagError::Malformed { .. }))
        ));
    }

    #[test]
    fn recent_tag_across_variants() {
        let mut git = FakeGit::new();
        let a = git.commit("first");
        git.tag("app/3", &a);
        let b = git.commit("second");
        git.tag("beta/40", &b);
        let c = git.commit("third");
        git.tag("other/1", &c);

        let pattern = pattern();
        let resolver = TagRangeResolver::new(&git, &pattern);
        let tag = resolver
            .find_recent_build_tag(&["app".into(), "beta".into()])
            .unwrap()
            .unwrap();
        assert_eq!(tag.name, "beta/40");

        let any = resolver.find_recent_build_tag(&[]).unwrap().unwrap();
        assert_eq!(any.name, "other/1");
    }

    #[test]
    fn recent_tag_none_when_empty() {
        let git = FakeGit::new();
        let pattern = pattern();
        let resolver = TagRangeResolver::new(&git, &pattern);
        assert_eq!(resolver.find_recent_build_tag(&["app".into()]).unwrap(), None);
    }

    #[test]
    fn range_from_snapshot_skips_newer_tags() {
        let mut git = FakeGit::new();
        let a = git.commit("first");
        git.tag("app/1", &a);
        let b = git.commit("second");
        git.tag("app/2", &b);
        let c = git.commit("third");
        git.tag("app/3", &c);

        let pattern = pattern();
        let snapshot = pattern.parse_tag("app/2", b.clone(), "").unwrap();
        let range = TagRangeResolver::new(&git, &pattern)
            .find_tag_range_from(&snapshot)
            .unwrap();

        assert_eq!(range.current.name, "app/2");
        assert_eq!(range.previous.unwrap().name, "app/1");
    }

    #[test]
    fn recent_tag_range_agrees_with_variant_range() {
        let mut git = FakeGit::new();
        let a = git.commit("first");
        git.tag("app/6", &a);
        let b = git.commit("second");
        git.tag("app/8", &b);
        git.tag("app/7", &b);

        let pattern = pattern();
        let resolver = TagRangeResolver::new(&git, &pattern);
        let by_variant = resolver.find_tag_range("app").unwrap().unwrap();
        let recent = resolver.find_recent_build_tag(&[]).unwrap().unwrap();
        let from_recent = resolver.find_tag_range_from(&recent).unwrap();

        assert_eq!(by_variant.current.name, "app/8");
        assert_eq!(by_variant.previous.as_ref().unwrap().name, "app/7");
        assert_eq!(from_recent, by_variant);
    }

    #[test]
    fn range_from_snapshot_of_deleted_tag() {
        let mut git = FakeGit::new();
        let a = git.commit("first");
        git.tag("app/1", &a);
        let b = git.commit("second");

        let pattern = pattern();
        let snapshot = pattern.parse_tag("app/2", b, "").unwrap();
        let range = TagRangeResolver::new(&git, &pattern)
            .find_tag_range_from(&snapshot)
            .unwrap();
        assert_eq!(range.previous.unwrap().name, "app/1");
    }

    #[test]
    fn commit_range_display() {
        let range = CommitRange {
            from_sha: Some("abc".into()),
            to_sha: "def".into(),
        };
        assert_eq!(range.to_string(), "abc..def");
        assert_eq!(CommitRange::full_history("HEAD").to_string(), "(root)..HEAD");
    }
}
