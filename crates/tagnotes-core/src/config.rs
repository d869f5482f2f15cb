//! Configuration loading and discovery.
//!
//! This module provides configuration file discovery by:
//! 1. Walking up from the current directory to find project config
//! 2. Loading user config from XDG config directory
//! 3. Merging with sensible defaults
//!
//! # Supported formats
//!
//! - TOML (`.toml`)
//! - YAML (`.yaml`, `.yml`)
//! - JSON (`.json`)
//!
//! # Config file locations (in order of precedence, highest first):
//! - `.tagnotes.<ext>` in current directory or any parent
//! - `tagnotes.<ext>` in current directory or any parent
//! - `~/.config/tagnotes/config.<ext>` (user config)
//!
//! # Per-variant sections
//!
//! Changelog settings live under `[changelog.<variant>]`, with
//! `[changelog.default]` as the fallback. A variant section replaces the
//! default section entirely; fields are not merged between the two.
//!
//! ```toml
//! variants = ["googleRelease", "huaweiRelease"]
//!
//! [tags]
//! pattern = "{variant}/{build}"
//!
//! [changelog.default]
//! message_key = "CHANGELOG"
//! reference_pattern = 'PROJ-\d+'
//!
//! [changelog.huaweiRelease]
//! escape = "html"
//! ```
//!
//! # Example
//! ```no_run
//! use camino::Utf8PathBuf;
//! use tagnotes_core::config::{Config, ConfigLoader};
//!
//! let cwd = std::env::current_dir().unwrap();
//! let cwd = Utf8PathBuf::try_from(cwd).expect("current directory is not valid UTF-8");
//! let config = ConfigLoader::new()
//!     .with_project_search(&cwd)
//!     .load()
//!     .unwrap();
//! let settings = config.changelog_settings(Some("googleRelease")).unwrap();
//! ```

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use figment::Figment;
use figment::providers::{Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};

use crate::changelog::ChangelogSettings;
use crate::error::{ConfigError, ConfigResult};
use crate::references::ReferencePattern;
use crate::render::{ChatLimits, EscapeRules};
use crate::tag::TagPattern;

/// Where `tagnotes snapshot` writes by default, relative to the working
/// directory.
pub const DEFAULT_SNAPSHOT_PATH: &str = "build/tag-snapshot.json";

/// The configuration for tagnotes.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Log level for the application (e.g., "debug", "info", "warn", "error").
    pub log_level: LogLevel,
    /// Directory for JSONL log files (falls back to platform defaults if unset).
    pub log_dir: Option<Utf8PathBuf>,
    /// Build variants considered when no variant is given.
    pub variants: Vec<String>,
    /// Build tag naming convention.
    pub tags: TagsConfig,
    /// Changelog settings keyed by variant, with a `default` fallback.
    pub changelog: VariantMap<ChangelogConfig>,
    /// Snapshot file location (default: [`DEFAULT_SNAPSHOT_PATH`]).
    pub snapshot_path: Option<Utf8PathBuf>,
}

impl Config {
    /// The tag pattern described by `[tags]`.
    pub fn tag_pattern(&self) -> ConfigResult<TagPattern> {
        self.tags.build_pattern()
    }

    /// Resolve changelog settings for `variant`.
    ///
    /// Looks up `[changelog.<variant>]`, then `[changelog.default]`, then
    /// built-in defaults.
    #[tracing::instrument(skip(self))]
    pub fn changelog_settings(&self, variant: Option<&str>) -> ConfigResult<ChangelogSettings> {
        let section = self
            .changelog
            .resolve(variant.unwrap_or(DEFAULT_VARIANT_KEY))
            .cloned()
            .unwrap_or_default();
        section.into_settings(self.tag_pattern()?)
    }

    /// Where `snapshot` writes, relative to the working directory.
    pub fn snapshot_path(&self) -> &Utf8Path {
        self.snapshot_path
            .as_deref()
            .unwrap_or_else(|| Utf8Path::new(DEFAULT_SNAPSHOT_PATH))
    }
}

/// Key of the fallback entry in a [`VariantMap`].
pub const DEFAULT_VARIANT_KEY: &str = "default";

/// Variant name → value, resolved through an ordered fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct VariantMap<T>(BTreeMap<String, T>);

impl<T> Default for VariantMap<T> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<T> VariantMap<T> {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value for `variant`, returning the old one.
    pub fn insert(&mut self, variant: impl Into<String>, value: T) -> Option<T> {
        self.0.insert(variant.into(), value)
    }

    /// Keys tried by [`resolve`](Self::resolve), in order.
    pub fn fallback_chain(name: &str) -> [&str; 2] {
        [name, DEFAULT_VARIANT_KEY]
    }

    /// The entry for `name`, else the `default` entry.
    pub fn resolve(&self, name: &str) -> Option<&T> {
        Self::fallback_chain(name)
            .into_iter()
            .find_map(|key| self.0.get(key))
    }

    /// True when no variant, not even `default`, is configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> FromIterator<(String, T)> for VariantMap<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Build tag naming convention.
///
/// Either a `pattern` template, or a `regex` with the `glob` used to query
/// tags. Unset means `{variant}/{build}`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct TagsConfig {
    /// Template with `{variant}` and `{build}` placeholders.
    pub pattern: Option<String>,
    /// Regex with named `variant` and `build` groups.
    pub regex: Option<String>,
    /// Tag query glob for `regex`; `{variant}` is substituted.
    pub glob: Option<String>,
}

impl TagsConfig {
    /// Compile the configured convention.
    pub fn build_pattern(&self) -> ConfigResult<TagPattern> {
        match (&self.pattern, &self.regex, &self.glob) {
            (Some(_), Some(_), _) => Err(ConfigError::Invalid(
                "[tags] sets both `pattern` and `regex`; choose one".into(),
            )),
            (None, Some(regex), Some(glob)) => Ok(TagPattern::from_regex(regex, glob)?),
            (None, Some(_), None) => Err(ConfigError::Invalid(
                "[tags] `regex` requires a `glob` for tag queries".into(),
            )),
            (Some(template), None, _) => Ok(TagPattern::template(template)?),
            (None, None, _) => Ok(TagPattern::default()),
        }
    }
}

/// Reserved-character escaping preset for markup output.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EscapePreset {
    /// Telegram MarkdownV2.
    #[default]
    Telegram,
    /// Slack mrkdwn.
    Slack,
    /// HTML entities.
    Html,
    /// No escaping; only `escape_rules` apply.
    #[serde(rename = "none")]
    Raw,
}

impl EscapePreset {
    /// The rule table for this preset.
    pub fn rules(self) -> EscapeRules {
        match self {
            Self::Telegram => EscapeRules::telegram_markdown_v2(),
            Self::Slack => EscapeRules::slack_mrkdwn(),
            Self::Html => EscapeRules::html(),
            Self::Raw => EscapeRules::default(),
        }
    }
}

/// One `[changelog.<variant>]` section. Unset fields take built-in defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChangelogConfig {
    /// Keep only subjects containing this key.
    pub message_key: Option<String>,
    /// Remove the key from kept subjects (default: true).
    pub strip_message_key: Option<bool>,
    /// Subject prefix marking reverts (default: `Revert "`).
    pub revert_marker: Option<String>,
    /// Regex for issue references, e.g. `PROJ-\d+`.
    pub reference_pattern: Option<String>,
    /// Prefix for Markdown issue links.
    pub issue_url_prefix: Option<String>,
    /// Chat sections before the rest are summarized (default: 50).
    pub max_entries: Option<usize>,
    /// Escaped characters per chat section (default: 3000).
    pub max_chars_per_entry: Option<usize>,
    /// Markup escaping preset (default: telegram).
    pub escape: Option<EscapePreset>,
    /// Extra or overriding escape rules, single character → replacement.
    pub escape_rules: BTreeMap<String, String>,
}

impl ChangelogConfig {
    /// Validate and convert into pipeline settings.
    pub fn into_settings(self, tag_pattern: TagPattern) -> ConfigResult<ChangelogSettings> {
        let defaults = ChangelogSettings::default();

        let reference_pattern = self
            .reference_pattern
            .as_deref()
            .map(ReferencePattern::compile)
            .transpose()?;

        let limits = ChatLimits {
            max_entries: self.max_entries.unwrap_or(defaults.limits.max_entries),
            max_chars_per_entry: self
                .max_chars_per_entry
                .unwrap_or(defaults.limits.max_chars_per_entry),
        };
        if limits.max_chars_per_entry == 0 {
            return Err(ConfigError::Invalid(
                "`max_chars_per_entry` must be at least 1".into(),
            ));
        }

        let mut escape_rules = self.escape.unwrap_or_default().rules();
        for (reserved, escaped) in self.escape_rules {
            let mut chars = reserved.chars();
            let (Some(c), None) = (chars.next(), chars.next()) else {
                return Err(ConfigError::Invalid(format!(
                    "escape rule key `{reserved}` must be a single character"
                )));
            };
            escape_rules.insert(c, escaped);
        }

        Ok(ChangelogSettings {
            tag_pattern,
            message_key: self.message_key,
            strip_message_key: self.strip_message_key.unwrap_or(defaults.strip_message_key),
            revert_marker: self.revert_marker.unwrap_or(defaults.revert_marker),
            reference_pattern,
            issue_url_prefix: self.issue_url_prefix,
            limits,
            escape_rules,
        })
    }
}

/// Log level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Verbose output for debugging and development.
    Debug,
    /// Standard operational information (default).
    #[default]
    Info,
    /// Warnings about potential issues.
    Warn,
    /// Errors that indicate failures.
    Error,
}

impl LogLevel {
    /// Returns the log level as a lowercase string slice.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Supported configuration file extensions (in order of preference).
const CONFIG_EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "json"];

/// Application name for XDG directory lookup and config file names.
const APP_NAME: &str = "tagnotes";

/// Builder for loading configuration from multiple sources.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Starting directory for project config search.
    project_search_root: Option<Utf8PathBuf>,
    /// Whether to include user config from XDG directory.
    include_user_config: bool,
    /// Stop searching when we hit a directory containing this file/dir.
    boundary_marker: Option<String>,
    /// Explicit config files to load.
    explicit_files: Vec<Utf8PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default settings.
    pub fn new() -> Self {
        Self {
            project_search_root: None,
            include_user_config: true,
            boundary_marker: Some(".git".to_string()),
            explicit_files: Vec::new(),
        }
    }

    /// Set the starting directory for project config search.
    pub fn with_project_search<P: AsRef<Utf8Path>>(mut self, path: P) -> Self {
        self.project_search_root = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set whether to include user config from `~/.config/tagnotes/`.
    pub const fn with_user_config(mut self, include: bool) -> Self {
        self.include_user_config = include;
        self
    }

    /// Stop walking up at a directory containing `marker` (default `.git`).
    pub fn with_boundary_marker<S: Into<String>>(mut self, marker: S) -> Self {
        self.boundary_marker = Some(marker.into());
        self
    }

    /// Disable boundary marker (search all the way to filesystem root).
    pub fn without_boundary_marker(mut self) -> Self {
        self.boundary_marker = None;
        self
    }

    /// Add an explicit config file. Later files take precedence.
    pub fn with_file<P: AsRef<Utf8Path>>(mut self, path: P) -> Self {
        self.explicit_files.push(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration, merging all discovered sources.
    ///
    /// Precedence (highest to lowest):
    /// 1. Explicit files (in order added via `with_file`)
    /// 2. Project config (closest to search root)
    /// 3. User config (`~/.config/tagnotes/config.<ext>`)
    /// 4. Default values
    #[tracing::instrument(skip(self), fields(search_root = ?self.project_search_root))]
    pub fn load(self) -> ConfigResult<Config> {
        tracing::debug!("loading configuration");
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if self.include_user_config
            && let Some(user_config) = self.find_user_config()
        {
            figment = Self::merge_file(figment, &user_config);
        }

        if let Some(ref root) = self.project_search_root
            && let Some(project_config) = self.find_project_config(root)
        {
            tracing::debug!(path = %project_config, "project config found");
            figment = Self::merge_file(figment, &project_config);
        }

        for file in &self.explicit_files {
            figment = Self::merge_file(figment, file);
        }

        let config: Config = figment
            .extract()
            .map_err(|e| ConfigError::Deserialize(Box::new(e)))?;
        tracing::info!(
            log_level = config.log_level.as_str(),
            variants = config.variants.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Load configuration, returning an error if no config file is found.
    pub fn load_or_error(self) -> ConfigResult<Config> {
        let has_user = self.include_user_config && self.find_user_config().is_some();
        let has_project = self
            .project_search_root
            .as_ref()
            .and_then(|root| self.find_project_config(root))
            .is_some();
        let has_explicit = !self.explicit_files.is_empty();

        if !has_user && !has_project && !has_explicit {
            return Err(ConfigError::NotFound);
        }

        self.load()
    }

    /// Find project config by walking up from the given directory.
    fn find_project_config(&self, start: &Utf8Path) -> Option<Utf8PathBuf> {
        let mut current = Some(start.to_path_buf());

        while let Some(dir) = current {
            for ext in CONFIG_EXTENSIONS {
                let dotfile = dir.join(format!(".{APP_NAME}.{ext}"));
                if dotfile.is_file() {
                    return Some(dotfile);
                }

                let regular = dir.join(format!("{APP_NAME}.{ext}"));
                if regular.is_file() {
                    return Some(regular);
                }
            }

            // The repository root is the last directory searched.
            if let Some(ref marker) = self.boundary_marker
                && dir.join(marker).exists()
            {
                break;
            }

            current = dir.parent().map(Utf8Path::to_path_buf);
        }

        None
    }

    /// Find user config in XDG config directory.
    fn find_user_config(&self) -> Option<Utf8PathBuf> {
        let config_dir = user_config_dir()?;
        CONFIG_EXTENSIONS
            .iter()
            .map(|ext| config_dir.join(format!("config.{ext}")))
            .find(|path| path.is_file())
    }

    /// Merge a config file into the figment, detecting format from extension.
    fn merge_file(figment: Figment, path: &Utf8Path) -> Figment {
        match path.extension() {
            Some("toml") => figment.merge(Toml::file_exact(path.as_str())),
            Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path.as_str())),
            Some("json") => figment.merge(Json::file_exact(path.as_str())),
            _ => figment.merge(Toml::file_exact(path.as_str())),
        }
    }
}

/// Get the user config directory path.
///
/// Returns `~/.config/tagnotes/` on Linux, `~/Library/Application Support/tagnotes/`
/// on macOS, and equivalent on other platforms.
pub fn user_config_dir() -> Option<Utf8PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("", "", APP_NAME)?;
    Utf8PathBuf::from_path_buf(proj_dirs.config_dir().to_path_buf()).ok()
}
