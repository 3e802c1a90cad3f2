//! Configuration error types

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors produced while loading, validating or persisting the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("invalid configuration field {field}: {reason}")]
    Validation { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Returns true for invariant violations (as opposed to I/O or parse failures)
    pub fn is_validation(&self) -> bool {
        matches!(self, ConfigError::Validation { .. })
    }

    /// Name of the offending field, for validation errors
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ConfigError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}
