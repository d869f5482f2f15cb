//! Structured references (issue keys) in commit subjects.

use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;
use tracing::debug;

use crate::render::ChangelogEntry;

/// Errors compiling a reference pattern.
#[derive(Error, Debug)]
pub enum ReferenceError {
    /// The pattern is not a valid regex.
    #[error("invalid reference pattern `{pattern}`: {source}")]
    InvalidPattern {
        /// The pattern as configured.
        pattern: String,
        /// Compiler error.
        #[source]
        source: regex::Error,
    },
}

/// Result alias for reference operations.
pub type ReferenceResult<T> = Result<T, ReferenceError>;

/// A compiled reference pattern such as `PROJ-\d+`.
///
/// When the regex has a capture group, group 1 is the reference; otherwise
/// the whole match is.
#[derive(Debug, Clone)]
pub struct ReferencePattern(Regex);

impl ReferencePattern {
    /// Compile `pattern`.
    pub fn compile(pattern: &str) -> ReferenceResult<Self> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|source| ReferenceError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    /// The source pattern.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Distinct references in `subject`, in match order.
    pub fn find_all(&self, subject: &str) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for caps in self.0.captures_iter(subject) {
            let Some(m) = caps.get(1).or_else(|| caps.get(0)) else {
                continue;
            };
            if m.as_str().is_empty() || found.iter().any(|f| f == m.as_str()) {
                continue;
            }
            found.push(m.as_str().to_string());
        }
        found
    }
}

impl PartialEq for ReferencePattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// Subject → references, in subject order. Subjects without a match have no
/// entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct References {
    entries: Vec<(String, Vec<String>)>,
}

impl References {
    /// References found in `subject`, if any.
    pub fn get(&self, subject: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(s, _)| s == subject)
            .map(|(_, refs)| refs.as_slice())
    }

    /// Number of subjects with at least one reference.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no subject matched.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(subject, references)` pairs in subject order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(s, refs)| (s.as_str(), refs.as_slice()))
    }

    /// Every distinct reference across all subjects, first-seen order.
    pub fn all_references(&self) -> Vec<&str> {
        let mut all: Vec<&str> = Vec::new();
        for r in self.entries.iter().flat_map(|(_, refs)| refs) {
            if !all.contains(&r.as_str()) {
                all.push(r);
            }
        }
        all
    }
}

impl Serialize for References {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (subject, refs) in &self.entries {
            map.serialize_entry(subject, refs)?;
        }
        map.end()
    }
}

/// Outcome of a reference scan.
///
/// `NotConfigured` and `Scanned` with no entries are different states: the
/// first means no pattern was set, the second that nothing matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceScan {
    /// No reference pattern is configured.
    NotConfigured,
    /// The pattern ran; possibly without matches.
    Scanned(References),
}

impl ReferenceScan {
    /// Scan `subjects` when a pattern is configured.
    pub fn scan(subjects: &[String], pattern: Option<&ReferencePattern>) -> Self {
        match pattern {
            Some(pattern) => Self::Scanned(extract_references(subjects, pattern)),
            None => Self::NotConfigured,
        }
    }

    /// The scanned references, `None` when unconfigured.
    pub fn references(&self) -> Option<&References> {
        match self {
            Self::NotConfigured => None,
            Self::Scanned(refs) => Some(refs),
        }
    }
}

impl Serialize for ReferenceScan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::NotConfigured => serializer.serialize_none(),
            Self::Scanned(refs) => serializer.serialize_some(refs),
        }
    }
}

/// Map each matching subject to its distinct references.
pub fn extract_references(subjects: &[String], pattern: &ReferencePattern) -> References {
    let mut entries: Vec<(String, Vec<String>)> = Vec::new();
    for subject in subjects {
        let found = pattern.find_all(subject);
        if found.is_empty() {
            continue;
        }
        match entries.iter_mut().find(|(s, _)| s == subject) {
            Some((_, refs)) => {
                for r in found {
                    if !refs.contains(&r) {
                        refs.push(r);
                    }
                }
            }
            None => entries.push((subject.clone(), found)),
        }
    }

    debug!(
        subjects = subjects.len(),
        matched = entries.len(),
        pattern = pattern.as_str(),
        "references extracted"
    );
    References { entries }
}

/// Pair each subject with its references.
pub fn annotate(subjects: &[String], references: &References) -> Vec<ChangelogEntry> {
    subjects
        .iter()
        .map(|subject| ChangelogEntry {
            subject: subject.clone(),
            references: references.get(subject).map(<[String]>::to_vec).unwrap_or_default(),
        })
        .collect()
}
