//! Core library for tagnotes.
//!
//! Derives release changelogs for mobile builds from build tags: find the
//! pair of tags bounding a variant's unreleased commits, pull and filter the
//! commit subjects in between, pick out issue references, and render the
//! result for a publishing channel.
//!
//! # Modules
//!
//! - [`git`] - The [`VcsExecutor`] seam and its `git` implementation
//! - [`tag`] - Build tag naming conventions and parsing
//! - [`snapshot`] - Pinning the current build tag to a JSON file
//! - [`resolve`] - Tag range resolution
//! - [`commits`] - Commit subject extraction, filtering, deduplication
//! - [`references`] - Issue references in commit subjects
//! - [`render`] - Plain text, chat blocks, escaped markup, Markdown
//! - [`changelog`] - The end-to-end pipeline
//! - [`config`] - Configuration loading and per-variant settings
//! - [`error`] - Configuration error types
//!
//! # Quick Start
//!
//! ```no_run
//! use tagnotes_core::{ChangelogRequest, ConfigLoader, OutputFormat, SystemGit, build_changelog};
//!
//! let config = ConfigLoader::new().load().expect("failed to load configuration");
//! let settings = config.changelog_settings(Some("googleRelease")).unwrap();
//! let git = SystemGit::new(".").unwrap();
//! let request = ChangelogRequest {
//!     variant: Some("googleRelease".into()),
//!     ..ChangelogRequest::default()
//! };
//! let changelog = build_changelog(&git, &settings, &request).unwrap();
//! println!("{}", changelog.render(OutputFormat::Plain, &settings).unwrap());
//! ```
#![deny(unsafe_code)]

pub mod changelog;

pub mod commits;

pub mod config;

pub mod error;

pub mod git;

pub mod references;

pub mod render;

pub mod resolve;

pub mod snapshot;

pub mod tag;

pub use changelog::{
    Changelog, ChangelogError, ChangelogRequest, ChangelogSettings, OutputFormat, build_changelog,
};
pub use config::{Config, ConfigLoader, LogLevel, VariantMap};
pub use error::{ConfigError, ConfigResult};
pub use git::{GitError, SystemGit, VcsExecutor};
pub use resolve::{CommitRange, TagRange, TagRangeResolver};
pub use tag::{BuildTag, TagPattern};
