//! Backup archive naming
//!
//! Path computation is pure: the clock reading is passed in. Creating the
//! automatic backup directory is a separate, idempotent step.

use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use super::errors::{BackupError, BackupResult};

/// File name prefix of manual backups
pub const MANUAL_BACKUP_PREFIX: &str = "mmomni-backup";

/// File name prefix of automatic backups
pub const AUTO_BACKUP_PREFIX: &str = "mmobackup";

const AUTO_BACKUP_DIR_MODE: u32 = 0o700;

/// How the archive location is chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupMode {
    /// Operator-triggered backup, optionally to an explicit path
    Manual {
        output: Option<PathBuf>,
        db_only: bool,
    },
    /// Scheduled backup into the automatic backup directory
    Automatic { directory: PathBuf },
}

/// Resolved archive location and contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupTarget {
    pub path: PathBuf,
    pub db_only: bool,
}

/// `mmomni-backup_<YYYYMMDDHHMM>.tgz`, relative to the working directory
pub fn manual_backup_path(now: &NaiveDateTime) -> PathBuf {
    PathBuf::from(format!(
        "{}_{}.tgz",
        MANUAL_BACKUP_PREFIX,
        now.format("%Y%m%d%H%M")
    ))
}

/// `<directory>/mmobackup_<YYYYMMDD_HHMMSS>.tgz`
pub fn auto_backup_path(directory: &Path, now: &NaiveDateTime) -> PathBuf {
    directory.join(format!(
        "{}_{}.tgz",
        AUTO_BACKUP_PREFIX,
        now.format("%Y%m%d_%H%M%S")
    ))
}

/// Resolve where the archive goes and whether the data directory is included.
///
/// Automatic backups are always database-only.
pub fn resolve_target(mode: &BackupMode, now: &NaiveDateTime) -> BackupTarget {
    match mode {
        BackupMode::Manual { output, db_only } => BackupTarget {
            path: output.clone().unwrap_or_else(|| manual_backup_path(now)),
            db_only: *db_only,
        },
        BackupMode::Automatic { directory } => BackupTarget {
            path: auto_backup_path(directory, now),
            db_only: true,
        },
    }
}

/// Create the automatic backup directory (mode 0700) if it is missing
pub fn ensure_auto_backup_dir(directory: &Path) -> BackupResult<()> {
    DirBuilder::new()
        .recursive(true)
        .mode(AUTO_BACKUP_DIR_MODE)
        .create(directory)
        .map_err(|e| {
            BackupError::io_error(
                format!(
                    "Failed to create automatic backup directory: {}",
                    directory.display()
                ),
                e,
            )
        })
}
