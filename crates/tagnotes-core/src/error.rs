//! Error types for tagnotes-core configuration.

use thiserror::Error;

use crate::references::ReferenceError;
use crate::tag::TagError;

/// Errors that can occur when working with configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error("invalid configuration: {0}")]
    Deserialize(#[from] Box<figment::Error>),

    /// Configuration file not found after searching all locations.
    #[error("no configuration file found")]
    NotFound,

    /// A value parsed but cannot be used.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The tag convention does not compile.
    #[error("invalid configuration: {0}")]
    Tag(#[from] TagError),

    /// The reference pattern does not compile.
    #[error("invalid configuration: {0}")]
    Reference(#[from] ReferenceError),
}

/// Result type alias using [`ConfigError`].
pub type ConfigResult<T> = Result<T, ConfigError>;
