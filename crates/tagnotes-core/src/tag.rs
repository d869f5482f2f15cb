//! Build tags and the naming convention that encodes them.
//!
//! A build tag marks one released build of one build variant. Its name
//! carries the variant and a monotonically increasing build number, laid out
//! by a [`TagPattern`]. The default convention is `{variant}/{build}`, so
//! `googleRelease/42` is build 42 of the `googleRelease` variant. Any name
//! may carry a trailing `-<suffix>` (e.g. `googleRelease/42-hotfix`).
//!
//! Names that do not fit the pattern are errors, not skipped tags: a
//! malformed tag may hide a real release and must surface.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Placeholder for the variant in a tag template.
pub const VARIANT_PLACEHOLDER: &str = "{variant}";

/// Placeholder for the build number in a tag template.
pub const BUILD_PLACEHOLDER: &str = "{build}";

/// The default tag template.
pub const DEFAULT_TEMPLATE: &str = "{variant}/{build}";

/// Errors from tag parsing and pattern construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    /// A tag name does not match the configured convention.
    #[error("tag `{name}` does not match build tag pattern `{pattern}`")]
    Malformed {
        /// The offending tag name.
        name: String,
        /// The pattern it was checked against.
        pattern: String,
    },

    /// The build number does not fit in a `u64`.
    #[error("tag `{name}` has an out-of-range build number")]
    BuildNumberOverflow {
        /// The offending tag name.
        name: String,
    },

    /// The pattern itself is unusable.
    #[error("invalid build tag pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// The pattern as configured.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Result alias for tag operations.
pub type TagResult<T> = Result<T, TagError>;

/// One released build of one variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTag {
    /// Raw tag name.
    pub name: String,
    /// Commit the tag points at.
    pub commit_sha: String,
    /// Annotation text; empty for lightweight tags.
    #[serde(default)]
    pub message: String,
    /// The build variant this release belongs to.
    pub build_variant: String,
    /// Monotonic build number within the variant.
    pub build_number: u64,
    /// Free-form trailing suffix, if the name had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

impl BuildTag {
    /// Canonical tag name for this build under `pattern`.
    ///
    /// The build number is written without zero padding, so `app/007`
    /// parses to build 7 and renders back as `app/7`; [`BuildTag::name`]
    /// keeps the original spelling. Returns `None` for regex-based patterns,
    /// which cannot be inverted.
    pub fn tag_name(&self, pattern: &TagPattern) -> Option<String> {
        let base = pattern.format(&self.build_variant, self.build_number)?;
        Some(match self.suffix {
            Some(ref suffix) => format!("{base}-{suffix}"),
            None => base,
        })
    }
}

#[derive(Debug, Clone)]
enum PatternSource {
    Template(String),
    Regex { regex: String, glob: String },
}

/// A build-tag naming convention.
///
/// Built either from a template with `{variant}` and `{build}` placeholders,
/// or from a raw regex with named groups `variant`, `build`, and optionally
/// `suffix`. A pattern can be narrowed to one variant with
/// [`for_variant`](Self::for_variant); narrowed patterns reject tags of other
/// variants and parse variant names containing separators unambiguously.
#[derive(Debug, Clone)]
pub struct TagPattern {
    source: PatternSource,
    regex: Regex,
    variant: Option<String>,
}

impl Default for TagPattern {
    fn default() -> Self {
        // The default template is known-good.
        Self::template(DEFAULT_TEMPLATE).unwrap_or_else(|_| unreachable!())
    }
}

impl TagPattern {
    /// Build a pattern from a template such as `{variant}/{build}`.
    pub fn template(template: &str) -> TagResult<Self> {
        for placeholder in [VARIANT_PLACEHOLDER, BUILD_PLACEHOLDER] {
            let count = template.matches(placeholder).count();
            if count != 1 {
                return Err(TagError::InvalidPattern {
                    pattern: template.to_string(),
                    reason: format!("expected exactly one {placeholder} placeholder, found {count}"),
                });
            }
        }

        let regex = compile(template, &template_regex(template, None))?;
        Ok(Self {
            source: PatternSource::Template(template.to_string()),
            regex,
            variant: None,
        })
    }

    /// Build a pattern from a raw regex and the glob used to query tags.
    ///
    /// The regex must define `variant` and `build` named groups. The glob may
    /// contain `{variant}`, which is substituted when querying one variant.
    pub fn from_regex(regex: &str, glob: &str) -> TagResult<Self> {
        let compiled = compile(regex, regex)?;
        let names: Vec<&str> = compiled.capture_names().flatten().collect();
        for group in ["variant", "build"] {
            if !names.contains(&group) {
                return Err(TagError::InvalidPattern {
                    pattern: regex.to_string(),
                    reason: format!("missing named group `{group}`"),
                });
            }
        }

        Ok(Self {
            source: PatternSource::Regex {
                regex: regex.to_string(),
                glob: glob.to_string(),
            },
            regex: compiled,
            variant: None,
        })
    }

    /// Narrow this pattern to a single variant.
    pub fn for_variant(&self, variant: &str) -> TagResult<Self> {
        let regex = match self.source {
            PatternSource::Template(ref template) => {
                compile(template, &template_regex(template, Some(variant)))?
            }
            PatternSource::Regex { .. } => self.regex.clone(),
        };

        Ok(Self {
            source: self.source.clone(),
            regex,
            variant: Some(variant.to_string()),
        })
    }

    /// The pattern text as configured.
    pub fn as_str(&self) -> &str {
        match self.source {
            PatternSource::Template(ref template) => template,
            PatternSource::Regex { ref regex, .. } => regex,
        }
    }

    /// The variant this pattern is narrowed to, if any.
    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    /// Globs selecting this pattern's tags (all variants unless narrowed).
    pub fn globs(&self) -> Vec<String> {
        let variant = self.variant.as_deref().unwrap_or("*");
        match self.source {
            PatternSource::Template(ref template) => {
                let base = template
                    .replace(VARIANT_PLACEHOLDER, variant)
                    .replace(BUILD_PLACEHOLDER, "*");
                if base.ends_with('*') {
                    vec![base]
                } else {
                    // Suffixed names only match with an explicit `-*` tail.
                    let suffixed = format!("{base}-*");
                    vec![base, suffixed]
                }
            }
            PatternSource::Regex { ref glob, .. } => {
                vec![glob.replace(VARIANT_PLACEHOLDER, variant)]
            }
        }
    }

    /// Render the canonical name for `variant` and `build`.
    ///
    /// Only unpadded build numbers round-trip through [`Self::parse_tag`].
    /// Returns `None` for regex-based patterns.
    pub fn format(&self, variant: &str, build: u64) -> Option<String> {
        match self.source {
            PatternSource::Template(ref template) => Some(
                template
                    .replace(VARIANT_PLACEHOLDER, variant)
                    .replace(BUILD_PLACEHOLDER, &build.to_string()),
            ),
            PatternSource::Regex { .. } => None,
        }
    }

    /// Whether `name` fits this pattern.
    pub fn matches(&self, name: &str) -> bool {
        self.parse_name(name).is_ok()
    }

    /// Parse a tag into a [`BuildTag`].
    pub fn parse_tag(
        &self,
        name: impl Into<String>,
        commit_sha: impl Into<String>,
        message: impl Into<String>,
    ) -> TagResult<BuildTag> {
        let name = name.into();
        let (build_variant, build_number, suffix) = self.parse_name(&name)?;
        Ok(BuildTag {
            name,
            commit_sha: commit_sha.into(),
            message: message.into(),
            build_variant,
            build_number,
            suffix,
        })
    }

    fn parse_name(&self, name: &str) -> TagResult<(String, u64, Option<String>)> {
        let malformed = || TagError::Malformed {
            name: name.to_string(),
            pattern: self.describe(),
        };

        let caps = self.regex.captures(name).ok_or_else(malformed)?;
        let variant = caps.name("variant").ok_or_else(malformed)?.as_str();
        let build = caps.name("build").ok_or_else(malformed)?.as_str();

        if variant.is_empty() || self.variant.as_deref().is_some_and(|v| v != variant) {
            return Err(malformed());
        }

        let build_number = build.parse::<u64>().map_err(|_| {
            if !build.is_empty() && build.bytes().all(|b| b.is_ascii_digit()) {
                TagError::BuildNumberOverflow {
                    name: name.to_string(),
                }
            } else {
                malformed()
            }
        })?;

        let suffix = caps
            .name("suffix")
            .map(|m| m.as_str().to_string())
            .filter(|s| !s.is_empty());

        Ok((variant.to_string(), build_number, suffix))
    }

    fn describe(&self) -> String {
        match self.variant {
            Some(ref variant) => format!("{} (variant {variant})", self.as_str()),
            None => self.as_str().to_string(),
        }
    }
}

/// Translate a template into an anchored regex.
fn template_regex(template: &str, variant: Option<&str>) -> String {
    let variant_group = variant.map_or_else(
        || r"(?P<variant>\S+?)".to_string(),
        |v| format!("(?P<variant>{})", regex::escape(v)),
    );

    let mut out = String::from("^");
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&regex::escape(&rest[..start]));
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix(VARIANT_PLACEHOLDER) {
            out.push_str(&variant_group);
            rest = after;
        } else if let Some(after) = tail.strip_prefix(BUILD_PLACEHOLDER) {
            out.push_str(r"(?P<build>\d+)");
            rest = after;
        } else {
            out.push_str(r"\{");
            rest = &tail[1..];
        }
    }
    out.push_str(&regex::escape(rest));
    out.push_str(r"(?:-(?P<suffix>\S+))?$");
    out
}

fn compile(pattern: &str, regex: &str) -> TagResult<Regex> {
    Regex::new(regex).map_err(|e| TagError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
