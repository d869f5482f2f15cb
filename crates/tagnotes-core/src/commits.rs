//! Commit subject extraction and filtering.
//!
//! Turns a [`CommitRange`] into the ordered list of subjects eligible for a
//! changelog: merge commits and reverts are dropped, teams may require a
//! marker key (e.g. `CHANGELOG:`) to opt a commit in, and duplicates collapse
//! to their most recent occurrence.

use std::collections::HashSet;

use tracing::{debug, instrument};

use crate::git::{GitResult, VcsExecutor};
use crate::resolve::CommitRange;

/// Default prefix identifying revert commits.
pub const DEFAULT_REVERT_MARKER: &str = "Revert \"";

/// Pulls commit subjects for a range through a [`VcsExecutor`].
pub struct CommitExtractor<'a, E: VcsExecutor + ?Sized> {
    executor: &'a E,
    revert_marker: String,
}

impl<'a, E: VcsExecutor + ?Sized> CommitExtractor<'a, E> {
    /// Create an extractor using [`DEFAULT_REVERT_MARKER`].
    pub fn new(executor: &'a E) -> Self {
        Self {
            executor,
            revert_marker: DEFAULT_REVERT_MARKER.to_string(),
        }
    }

    /// Override the revert marker. An empty marker disables revert filtering.
    #[must_use]
    pub fn with_revert_marker(mut self, marker: impl Into<String>) -> Self {
        self.revert_marker = marker.into();
        self
    }

    /// Subjects in `range`, newest first, without merges or reverts.
    ///
    /// Merge commits are excluded by the executor. A non-merge commit whose
    /// subject happens to start with `Merge ` is kept.
    ///
    /// An unknown sha in the range is a [`GitError`](crate::git::GitError).
    #[instrument(skip(self), fields(range = %range))]
    pub fn extract_subjects(&self, range: &CommitRange) -> GitResult<Vec<String>> {
        let raw = self
            .executor
            .commit_subjects(range.from_sha.as_deref(), &range.to_sha)?;
        let total = raw.len();

        let subjects: Vec<String> = raw
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .filter(|s| self.revert_marker.is_empty() || !s.starts_with(&self.revert_marker))
            .collect();

        debug!(total, kept = subjects.len(), "subjects extracted");
        Ok(subjects)
    }
}

/// Keep subjects containing `key` (case-sensitive); pass all through when
/// `key` is `None`.
pub fn filter_by_key<I>(subjects: I, key: Option<&str>) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    match key {
        Some(key) => subjects.into_iter().filter(|s| s.contains(key)).collect(),
        None => subjects.into_iter().collect(),
    }
}

/// Remove the first occurrence of `key` and the separator around it.
///
/// `"CHANGELOG: Add login"` with key `CHANGELOG` becomes `"Add login"`. A
/// subject that would become empty is returned unchanged.
pub fn strip_key(subject: &str, key: &str) -> String {
    if key.is_empty() {
        return subject.to_string();
    }
    let Some(at) = subject.find(key) else {
        return subject.to_string();
    };

    let head = subject[..at].trim_end();
    let tail = subject[at + key.len()..]
        .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
        .trim_end();

    let stripped = match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (false, true) => head.to_string(),
        (false, false) => format!("{head} {tail}"),
    };

    if stripped.is_empty() {
        subject.to_string()
    } else {
        stripped
    }
}

/// Drop repeated subjects, keeping each first occurrence in place.
pub fn dedup<I>(subjects: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    subjects
        .into_iter()
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::fake::FakeGit;
    use crate::git::GitError;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn extracts_range_newest_first() {
        let mut git = FakeGit::new();
        let a = git.commit("before release");
        git.commit("add login");
        let c = git.commit("fix crash");

        let range = CommitRange {
            from_sha: Some(a),
            to_sha: c,
        };
        let subjects = CommitExtractor::new(&git).extract_subjects(&range).unwrap();
        assert_eq!(subjects, strings(&["fix crash", "add login"]));
    }

    #[test]
    fn full_history_includes_root() {
        let mut git = FakeGit::new();
        git.commit("initial");
        git.commit("second");

        let subjects = CommitExtractor::new(&git)
            .extract_subjects(&CommitRange::full_history("HEAD"))
            .unwrap();
        assert_eq!(subjects, strings(&["second", "initial"]));
    }

    #[test]
    fn drops_merges_and_reverts() {
        let mut git = FakeGit::new();
        git.commit("add login");
        git.merge("Merge branch 'feature'");
        git.commit("Revert \"add login\"");
        git.commit("   ");

        let subjects = CommitExtractor::new(&git)
            .extract_subjects(&CommitRange::full_history("HEAD"))
            .unwrap();
        assert_eq!(subjects, strings(&["add login"]));
    }

    #[test]
    fn keeps_ordinary_commits_starting_with_merge() {
        let mut git = FakeGit::new();
        git.commit("fix crash");
        git.merge("Merge branch 'contacts'");
        git.commit("Merge duplicate contacts on import");

        let subjects = CommitExtractor::new(&git)
            .extract_subjects(&CommitRange::full_history("HEAD"))
            .unwrap();
        assert_eq!(
            subjects,
            strings(&["Merge duplicate contacts on import", "fix crash"])
        );
    }

    #[test]
    fn custom_revert_marker() {
        let mut git = FakeGit::new();
        git.commit("add login");
        git.commit("[revert] add login");
        git.commit("Revert \"kept\"");

        let subjects = CommitExtractor::new(&git)
            .with_revert_marker("[revert]")
            .extract_subjects(&CommitRange::full_history("HEAD"))
            .unwrap();
        assert_eq!(subjects, strings(&["Revert \"kept\"", "add login"]));
    }

    #[test]
    fn unknown_sha_is_a_git_error() {
        let mut git = FakeGit::new();
        let a = git.commit("initial");
        let range = CommitRange {
            from_sha: Some("deadbeef".into()),
            to_sha: a,
        };
        let result = CommitExtractor::new(&git).extract_subjects(&range);
        assert!(matches!(result, Err(GitError::Command { .. })));
    }

    #[test]
    fn filter_by_key_is_case_sensitive() {
        let subjects = strings(&["CHANGELOG: add login", "changelog: lower", "fix typo"]);
        assert_eq!(
            filter_by_key(subjects, Some("CHANGELOG")),
            strings(&["CHANGELOG: add login"])
        );
    }

    #[test]
    fn filter_without_key_passes_through() {
        let subjects = strings(&["b", "a", "b"]);
        assert_eq!(filter_by_key(subjects.clone(), None), subjects);
    }

    #[test]
    fn filter_is_idempotent() {
        let subjects = strings(&["[CL] one", "two", "[CL] three", "four [CL]"]);
        for key in [Some("[CL]"), None, Some("missing")] {
            let once = filter_by_key(subjects.clone(), key);
            let twice = filter_by_key(once.clone(), key);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn dedup_keeps_first_seen_order() {
        let subjects = strings(&["a", "b", "a", "c", "b"]);
        assert_eq!(dedup(subjects), strings(&["a", "b", "c"]));
    }

    #[test]
    fn strip_key_variants() {
        assert_eq!(strip_key("CHANGELOG: Add login", "CHANGELOG"), "Add login");
        assert_eq!(strip_key("CHANGELOG:Add login", "CHANGELOG:"), "Add login");
        assert_eq!(strip_key("Add login [CL]", "[CL]"), "Add login");
        assert_eq!(strip_key("PROJ-1 [CL] Add login", "[CL]"), "PROJ-1 Add login");
        assert_eq!(strip_key("CHANGELOG:", "CHANGELOG"), "CHANGELOG:");
        assert_eq!(strip_key("no marker", "CHANGELOG"), "no marker");
    }
}
