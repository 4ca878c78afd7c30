//! Configuration error model.

use thiserror::Error;

/// Result type used when loading and validating configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration-level error.
///
/// Raised only while configuration is loaded. Once a catalog or route table
/// has been built, lookups against it are total and never produce these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value failed validation (e.g. an empty identifier).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A grant or requirement names a role that was never declared.
    #[error("unknown role '{0}'")]
    UnknownRole(String),

    /// A grant or requirement names a permission that was never declared.
    #[error("unknown permission '{0}'")]
    UnknownPermission(String),

    /// A declared role has no grant entry.
    #[error("declared role '{0}' has no grant entry")]
    MissingRole(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The configuration document could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// The configuration file could not be read.
    #[error("io error: {0}")]
    Io(String),
}

impl ConfigError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}
