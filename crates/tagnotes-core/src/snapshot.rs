//! Build-tag snapshots.
//!
//! A snapshot pins the build tag that was current when a build started, so
//! later tasks (possibly after CI has pushed or moved tags) work from the same
//! input. It is a small UTF-8 JSON object:
//!
//! ```json
//! {
//!   "name": "googleRelease/42",
//!   "commitSha": "3f2a…",
//!   "message": "Build 42",
//!   "buildVariant": "googleRelease",
//!   "buildNumber": 42
//! }
//! ```
//!
//! `message` may be absent (read back as empty). An optional `suffix` key
//! round-trips the tag's trailing suffix.

use std::io::Write;

use camino::Utf8Path;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::tag::BuildTag;

/// Errors reading or writing a snapshot.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The text is not a JSON object.
    #[error("snapshot is not a JSON object: {0}")]
    Syntax(String),

    /// A required key is absent.
    #[error("snapshot is missing required field `{field}`")]
    MissingField {
        /// The first missing key.
        field: &'static str,
    },

    /// A key is present with the wrong type.
    #[error("snapshot field `{field}` must be {expected}")]
    InvalidField {
        /// The offending key.
        field: &'static str,
        /// What the key should hold.
        expected: &'static str,
    },

    /// Failed to read the snapshot file.
    #[error("failed to read snapshot {path}: {source}")]
    Read {
        /// Snapshot file path.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to write the snapshot file.
    #[error("failed to write snapshot {path}: {source}")]
    Write {
        /// Snapshot file path.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Result alias for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

const NAME: &str = "name";
const COMMIT_SHA: &str = "commitSha";
const BUILD_VARIANT: &str = "buildVariant";
const BUILD_NUMBER: &str = "buildNumber";
const MESSAGE: &str = "message";
const SUFFIX: &str = "suffix";

/// Serialize a tag to snapshot JSON.
pub fn serialize(tag: &BuildTag) -> String {
    let mut map = Map::new();
    map.insert(NAME.into(), Value::String(tag.name.clone()));
    map.insert(COMMIT_SHA.into(), Value::String(tag.commit_sha.clone()));
    map.insert(MESSAGE.into(), Value::String(tag.message.clone()));
    map.insert(BUILD_VARIANT.into(), Value::String(tag.build_variant.clone()));
    map.insert(BUILD_NUMBER.into(), Value::Number(tag.build_number.into()));
    if let Some(ref suffix) = tag.suffix {
        map.insert(SUFFIX.into(), Value::String(suffix.clone()));
    }

    // A map of strings and integers always serializes.
    serde_json::to_string_pretty(&Value::Object(map)).unwrap_or_default()
}

/// Parse snapshot JSON back into a tag.
///
/// Required keys are checked in order (`name`, `commitSha`, `buildVariant`,
/// `buildNumber`) and the first missing or mistyped one is reported.
pub fn deserialize(text: &str) -> SnapshotResult<BuildTag> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| SnapshotError::Syntax(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(SnapshotError::Syntax(format!(
            "expected an object, found {}",
            kind(&value)
        )));
    };

    let name = required_str(&map, NAME)?;
    let commit_sha = required_str(&map, COMMIT_SHA)?;
    let build_variant = required_str(&map, BUILD_VARIANT)?;
    let build_number = match map.get(BUILD_NUMBER) {
        None => return Err(SnapshotError::MissingField {
            field: BUILD_NUMBER,
        }),
        Some(v) => v.as_u64().ok_or(SnapshotError::InvalidField {
            field: BUILD_NUMBER,
            expected: "a non-negative integer",
        })?,
    };
    let message = optional_str(&map, MESSAGE)?.unwrap_or_default();
    let suffix = optional_str(&map, SUFFIX)?;

    Ok(BuildTag {
        name,
        commit_sha,
        message,
        build_variant,
        build_number,
        suffix,
    })
}

/// Write a snapshot file, replacing any previous one.
///
/// Writes to a sibling temp file first and renames it into place, so readers
/// never observe a half-written snapshot.
#[instrument(skip(tag), fields(tag = %tag.name))]
pub fn write_snapshot(path: &Utf8Path, tag: &BuildTag) -> SnapshotResult<()> {
    let write_err = |source| SnapshotError::Write {
        path: path.to_string(),
        source,
    };

    let dir = match path.parent() {
        Some(dir) if !dir.as_str().is_empty() => dir,
        _ => Utf8Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    file.write_all(serialize(tag).as_bytes())
        .map_err(write_err)?;
    file.persist(path).map_err(|e| write_err(e.error))?;

    debug!(%path, "snapshot written");
    Ok(())
}

/// Read and parse a snapshot file.
#[instrument]
pub fn read_snapshot(path: &Utf8Path) -> SnapshotResult<BuildTag> {
    let text = std::fs::read_to_string(path).map_err(|source| SnapshotError::Read {
        path: path.to_string(),
        source,
    })?;
    let tag = deserialize(&text)?;
    debug!(tag = %tag.name, "snapshot read");
    Ok(tag)
}

fn required_str(map: &Map<String, Value>, field: &'static str) -> SnapshotResult<String> {
    match map.get(field) {
        None => Err(SnapshotError::MissingField { field }),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(SnapshotError::InvalidField {
            field,
            expected: "a string",
        }),
    }
}

fn optional_str(map: &Map<String, Value>, field: &'static str) -> SnapshotResult<Option<String>> {
    match map.get(field) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(SnapshotError::InvalidField {
            field,
            expected: "a string",
        }),
    }
}

const fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
