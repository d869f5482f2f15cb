//! Version-control access for build-tag discovery and commit listing.
//!
//! The changelog engine only talks to git through the [`VcsExecutor`] trait.
//! [`SystemGit`] is the production implementation: it shells out to `git` so
//! we inherit the user's configuration, credentials, and safe-directory
//! settings exactly as a CI job would see them.

use std::path::PathBuf;
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors from git queries.
///
/// Any of these is fatal for the task that issued the query. The engine never
/// retries them.
#[derive(Error, Debug)]
pub enum GitError {
    /// Failed to execute the `git` command.
    #[error("failed to run git: {0}")]
    Exec(#[from] std::io::Error),

    /// `git` returned a non-zero exit code.
    #[error("git {command} failed: {stderr}")]
    Command {
        /// The git subcommand that failed (e.g., "log").
        command: String,
        /// Captured stderr.
        stderr: String,
    },

    /// Not inside a git repository.
    #[error("not a git repository (or any parent up to mount point)")]
    NotARepo,

    /// No `git` binary on `PATH`.
    #[error("git executable not found on PATH")]
    NotInstalled,
}

/// Result alias for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// A tag as reported by version control, before build-tag parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTag {
    /// Short tag name (e.g., `googleRelease/42`).
    pub name: String,
    /// The commit the tag resolves to (peeled through annotated tags).
    pub commit_sha: String,
    /// Annotation subject, empty for lightweight tags.
    pub message: String,
}

/// The version-control capability the changelog engine depends on.
pub trait VcsExecutor {
    /// List tags matching any of `globs`, newest first by creation date.
    ///
    /// Returns `Ok(None)` when nothing matches. Ordering is the VCS creation
    /// order, never a lexical sort of tag names. `limit` caps the number of
    /// tags returned; `None` returns every match.
    fn find_build_tags(&self, globs: &[String], limit: Option<usize>)
    -> GitResult<Option<Vec<RawTag>>>;

    /// Commit subjects reachable from `to` but not from `from`, newest first.
    ///
    /// `from` is exclusive; `None` means the beginning of history. Merge
    /// commits are excluded.
    fn commit_subjects(&self, from: Option<&str>, to: &str) -> GitResult<Vec<String>>;
}

/// Field separator in `for-each-ref` output.
const FIELD_SEP: char = '\u{0}';

/// `for-each-ref` format: name, object type, object, peeled object, subject.
const TAG_FORMAT: &str =
    "--format=%(refname:strip=2)%00%(objecttype)%00%(objectname)%00%(*objectname)%00%(contents:subject)";

/// [`VcsExecutor`] backed by the system `git` binary.
#[derive(Debug, Clone)]
pub struct SystemGit {
    program: PathBuf,
    workdir: Utf8PathBuf,
}

impl SystemGit {
    /// Locate `git` on `PATH` and bind it to `workdir`.
    pub fn new(workdir: impl AsRef<Utf8Path>) -> GitResult<Self> {
        let program = which::which("git").map_err(|_| GitError::NotInstalled)?;
        Ok(Self {
            program,
            workdir: workdir.as_ref().to_path_buf(),
        })
    }

    /// The directory git commands run in.
    pub fn workdir(&self) -> &Utf8Path {
        &self.workdir
    }

    /// Check whether the working directory is inside a git repository.
    #[instrument(skip(self), fields(workdir = %self.workdir))]
    pub fn is_inside_repo(&self) -> GitResult<bool> {
        match self.run(&["rev-parse", "--is-inside-work-tree"]) {
            Ok(output) => Ok(output.trim() == "true"),
            Err(GitError::Command { .. } | GitError::NotARepo) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Run a git command and return its stdout.
    fn run(&self, args: &[&str]) -> GitResult<String> {
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(self.workdir.as_std_path())
            .output()?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

            if stderr.contains("not a git repository") {
                return Err(GitError::NotARepo);
            }

            Err(GitError::Command {
                command: args.first().unwrap_or(&"").to_string(),
                stderr,
            })
        }
    }
}

impl VcsExecutor for SystemGit {
    #[instrument(skip(self), fields(workdir = %self.workdir))]
    fn find_build_tags(
        &self,
        globs: &[String],
        limit: Option<usize>,
    ) -> GitResult<Option<Vec<RawTag>>> {
        let count = limit.map(|n| format!("--count={n}"));
        let patterns: Vec<String> = globs.iter().map(|g| format!("refs/tags/{g}")).collect();

        // The last --sort is the primary key; version sort only breaks
        // same-second creation ties.
        let mut args = vec![
            "for-each-ref",
            "--sort=-version:refname",
            "--sort=-creatordate",
            TAG_FORMAT,
        ];
        if let Some(ref count) = count {
            args.push(count);
        }
        args.extend(patterns.iter().map(String::as_str));

        let output = self.run(&args)?;
        let tags = parse_tag_lines(&output);
        debug!(count = tags.len(), "build tags found");

        if tags.is_empty() {
            Ok(None)
        } else {
            Ok(Some(tags))
        }
    }

    #[instrument(skip(self), fields(workdir = %self.workdir))]
    fn commit_subjects(&self, from: Option<&str>, to: &str) -> GitResult<Vec<String>> {
        let range = from.map_or_else(|| to.to_string(), |from| format!("{from}..{to}"));
        let output = self.run(&["log", "--no-merges", "--format=%s", &range, "--"])?;

        let subjects: Vec<String> = output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect();

        debug!(count = subjects.len(), %range, "commit subjects");
        Ok(subjects)
    }
}

/// Parse `for-each-ref` output produced with [`TAG_FORMAT`].
fn parse_tag_lines(output: &str) -> Vec<RawTag> {
    output
        .lines()
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let mut fields = line.splitn(5, FIELD_SEP);
            let name = fields.next()?;
            let object_type = fields.next()?;
            let object = fields.next()?;
            let peeled = fields.next().unwrap_or("");
            let subject = fields.next().unwrap_or("");

            // Annotated tags peel to the commit; lightweight tags point at it.
            let (commit_sha, message) = if object_type == "tag" {
                (peeled, subject)
            } else {
                (object, "")
            };

            Some(RawTag {
                name: name.to_string(),
                commit_sha: commit_sha.to_string(),
                message: message.to_string(),
            })
        })
        .collect()
}
