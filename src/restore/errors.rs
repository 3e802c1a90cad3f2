//! Restore-specific error types
//!
//! - Structured error codes in MMO_CATEGORY_NAME format
//! - Every error aborts the restore; nothing is retried
//! - Errors raised before the configuration is persisted leave the host untouched

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::Path;

use crate::config::ConfigError;
use crate::database::DatabaseError;

/// Restore error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreErrorCode {
    /// Filesystem failure while staging or swapping
    MmoRestoreIo,
    /// Archive is not a valid backup
    MmoRestoreFormat,
    /// Merged configuration failed validation
    MmoRestoreValidation,
    /// Configuration missing, unreadable or unwritable
    MmoRestoreConfig,
    /// External restore tool failed
    MmoRestoreDependency,
}

impl RestoreErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreErrorCode::MmoRestoreIo => "MMO_RESTORE_IO",
            RestoreErrorCode::MmoRestoreFormat => "MMO_RESTORE_FORMAT",
            RestoreErrorCode::MmoRestoreValidation => "MMO_RESTORE_VALIDATION",
            RestoreErrorCode::MmoRestoreConfig => "MMO_RESTORE_CONFIG",
            RestoreErrorCode::MmoRestoreDependency => "MMO_RESTORE_DEPENDENCY",
        }
    }
}

impl fmt::Display for RestoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Restore error with full context
#[derive(Debug)]
pub struct RestoreError {
    code: RestoreErrorCode,
    message: String,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl RestoreError {
    fn new(
        code: RestoreErrorCode,
        message: impl Into<String>,
        source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source,
        }
    }

    /// Creates an I/O error during restore
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(RestoreErrorCode::MmoRestoreIo, message, Some(Box::new(source)))
    }

    /// Creates an I/O error at a specific path
    pub fn io_error_at_path(path: &Path, source: io::Error) -> Self {
        Self::io_error(format!("I/O error at {}", path.display()), source)
    }

    /// Creates an invalid archive error
    pub fn invalid_backup(message: impl Into<String>) -> Self {
        Self::new(RestoreErrorCode::MmoRestoreFormat, message, None)
    }

    /// Creates an invalid archive error with the decoder's error
    pub fn invalid_backup_with_source(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(
            RestoreErrorCode::MmoRestoreFormat,
            message,
            Some(Box::new(source)),
        )
    }

    /// Creates an error from a configuration failure.
    ///
    /// Validation failures get `MMO_RESTORE_VALIDATION`, everything else
    /// `MMO_RESTORE_CONFIG`.
    pub fn config_error(message: impl Into<String>, source: ConfigError) -> Self {
        let code = if source.is_validation() {
            RestoreErrorCode::MmoRestoreValidation
        } else {
            RestoreErrorCode::MmoRestoreConfig
        };
        Self::new(code, message, Some(Box::new(source)))
    }

    /// Creates an error for a failed external tool
    pub fn dependency_failed(message: impl Into<String>, source: DatabaseError) -> Self {
        Self::new(
            RestoreErrorCode::MmoRestoreDependency,
            message,
            Some(Box::new(source)),
        )
    }

    pub fn code(&self) -> RestoreErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for RestoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl StdError for RestoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

/// Result type for restore operations
pub type RestoreResult<T> = Result<T, RestoreError>;
