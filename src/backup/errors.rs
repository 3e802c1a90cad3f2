//! Backup-specific error types
//!
//! - Structured error codes in MMO_CATEGORY_NAME format
//! - Every error aborts the backup; nothing is retried
//! - A failed backup never leaves a usable partial archive behind

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::Path;

use crate::config::ConfigError;
use crate::database::DatabaseError;

/// Backup error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupErrorCode {
    /// Filesystem or stream failure
    MmoBackupIo,
    /// Installed configuration missing or invalid
    MmoBackupConfig,
    /// External dump tool failed
    MmoBackupDependency,
}

impl BackupErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupErrorCode::MmoBackupIo => "MMO_BACKUP_IO",
            BackupErrorCode::MmoBackupConfig => "MMO_BACKUP_CONFIG",
            BackupErrorCode::MmoBackupDependency => "MMO_BACKUP_DEPENDENCY",
        }
    }
}

impl fmt::Display for BackupErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Backup error with full context
#[derive(Debug)]
pub struct BackupError {
    code: BackupErrorCode,
    message: String,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl BackupError {
    fn new(
        code: BackupErrorCode,
        message: impl Into<String>,
        source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source,
        }
    }

    /// Creates an I/O error during backup
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(BackupErrorCode::MmoBackupIo, message, Some(Box::new(source)))
    }

    /// Creates an I/O error at a specific path
    pub fn io_error_at_path(path: &Path, source: io::Error) -> Self {
        Self::io_error(format!("I/O error at {}", path.display()), source)
    }

    /// Creates an I/O error that has no underlying OS error
    pub fn io_failed(message: impl Into<String>) -> Self {
        Self::new(BackupErrorCode::MmoBackupIo, message, None)
    }

    /// Creates a configuration error
    pub fn config_error(message: impl Into<String>, source: ConfigError) -> Self {
        Self::new(
            BackupErrorCode::MmoBackupConfig,
            message,
            Some(Box::new(source)),
        )
    }

    /// Creates an error for a failed external tool
    pub fn dependency_failed(message: impl Into<String>, source: DatabaseError) -> Self {
        Self::new(
            BackupErrorCode::MmoBackupDependency,
            message,
            Some(Box::new(source)),
        )
    }

    pub fn code(&self) -> BackupErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for BackupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl StdError for BackupError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

/// Result type for backup operations
pub type BackupResult<T> = Result<T, BackupError>;
