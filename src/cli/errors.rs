//! CLI-specific error types
//!
//! Subsystem errors keep their own code in the message; the CLI code says
//! which command failed.

use std::fmt;

use crate::backup::BackupError;
use crate::config::ConfigError;
use crate::restore::RestoreError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// Backup failed
    BackupFailed,
    /// Restore failed
    RestoreFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "MMO_CLI_CONFIG_ERROR",
            Self::BackupFailed => "MMO_CLI_BACKUP_FAILED",
            Self::RestoreFailed => "MMO_CLI_RESTORE_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<BackupError> for CliError {
    fn from(e: BackupError) -> Self {
        Self::new(CliErrorCode::BackupFailed, e.to_string())
    }
}

impl From<RestoreError> for CliError {
    fn from(e: RestoreError) -> Self {
        Self::new(CliErrorCode::RestoreFailed, e.to_string())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_error_keeps_subsystem_code() {
        let err: CliError = BackupError::io_failed("cannot list data directory").into();

        assert_eq!(err.code_str(), "MMO_CLI_BACKUP_FAILED");
        assert_eq!(
            err.to_string(),
            "MMO_CLI_BACKUP_FAILED: MMO_BACKUP_IO: cannot list data directory"
        );
    }

    #[test]
    fn test_restore_error_conversion() {
        let err: CliError = RestoreError::invalid_backup("missing database.dump").into();
        assert_eq!(err.code(), &CliErrorCode::RestoreFailed);
        assert!(err.message().contains("MMO_RESTORE_FORMAT"));
    }

    #[test]
    fn test_codes_name_the_failed_command() {
        let codes = [
            (CliErrorCode::ConfigError, "MMO_CLI_CONFIG_ERROR"),
            (CliErrorCode::BackupFailed, "MMO_CLI_BACKUP_FAILED"),
            (CliErrorCode::RestoreFailed, "MMO_CLI_RESTORE_FAILED"),
        ];

        for (code, name) in codes {
            // Exhaustive so a new code must be listed here too
            match code {
                CliErrorCode::ConfigError
                | CliErrorCode::BackupFailed
                | CliErrorCode::RestoreFailed => {}
            }
            assert_eq!(code.code(), name);
        }
    }

    #[test]
    fn test_config_error_conversion() {
        let err: CliError = ConfigError::NotFound("/etc/mattermost/mmomni.yml".into()).into();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
        assert!(err.message().contains("/etc/mattermost/mmomni.yml"));
    }
}
