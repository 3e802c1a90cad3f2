//! Backup subsystem for mmomni
//!
//! A backup is a single gzip-compressed tar archive:
//!
//! ```text
//! mmomni-backup_202401311200.tgz
//! ├── mmomni.yml       configuration document, as installed
//! ├── database.dump    pg_dump custom-format output, opaque
//! └── data/            data directory children (not in database-only backups)
//! ```
//!
//! # Algorithm
//!
//! 1. Load and validate the installed configuration
//! 2. Resolve the archive path (automatic backups are database-only)
//! 3. Create a private staging workspace
//! 4. Dump the database into the workspace
//! 5. Copy the configuration into the workspace
//! 6. Archive workspace files at the root and the data directory under `data/`
//! 7. Remove the workspace
//!
//! # Concurrency
//!
//! There is no locking. Running two backups to the same output path, or a
//! backup concurrently with a restore on the same host, is the caller's
//! responsibility to prevent.

mod archive;
mod errors;
mod naming;

pub use archive::{list_dir, write_archive, ArchiveSource, ArchiveSummary, ArchiveWriter};
pub use errors::{BackupError, BackupErrorCode, BackupResult};
pub use naming::{
    auto_backup_path, ensure_auto_backup_dir, manual_backup_path, resolve_target, BackupMode,
    BackupTarget, AUTO_BACKUP_PREFIX, MANUAL_BACKUP_PREFIX,
};

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::config::{Config, CONFIG_FILE_NAME};
use crate::database::{ConnectionParams, DatabaseTool, DUMP_FILE_NAME};
use crate::observability::{log_event, log_event_with_fields, Event, ObservationScope};
use crate::staging::StagingWorkspace;

/// Directory holding the data tree inside the archive
pub const DATA_ARCHIVE_DIR: &str = "data";

const STAGED_CONFIG_MODE: u32 = 0o600;

/// What to back up and where
#[derive(Debug, Clone)]
pub struct BackupOptions {
    /// Installed configuration document
    pub config_path: PathBuf,
    pub mode: BackupMode,
    /// Parent of the staging workspace; the system temp directory if unset
    pub staging_root: Option<PathBuf>,
}

/// Outcome of a successful backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub path: PathBuf,
    pub db_only: bool,
    pub files: u64,
    pub bytes: u64,
}

/// Backup manager for creating backup archives.
///
/// ```ignore
/// let manager = BackupManager::new(PgTools::new());
/// let report = manager.create_backup(&options, Local::now().naive_local())?;
/// ```
pub struct BackupManager<D> {
    database: D,
}

impl<D: DatabaseTool> BackupManager<D> {
    pub fn new(database: D) -> Self {
        Self { database }
    }

    /// Create a backup archive.
    ///
    /// `now` names the archive when no explicit output is given.
    ///
    /// # Errors
    ///
    /// - `MMO_BACKUP_CONFIG` if the installed configuration is missing or invalid
    /// - `MMO_BACKUP_DEPENDENCY` if `pg_dump` fails
    /// - `MMO_BACKUP_IO` for any filesystem failure
    ///
    /// The staging workspace is removed and no partial archive is left on failure.
    pub fn create_backup(
        &self,
        options: &BackupOptions,
        now: NaiveDateTime,
    ) -> BackupResult<BackupReport> {
        let config_path = options.config_path.display().to_string();
        let scope = ObservationScope::with_fields("BACKUP", &[("config", config_path.as_str())]);

        match self.create_backup_inner(options, &now) {
            Ok(report) => {
                let path = report.path.display().to_string();
                let files = report.files.to_string();
                scope.complete_with_fields(&[
                    ("path", path.as_str()),
                    ("files", files.as_str()),
                ]);
                Ok(report)
            }
            Err(e) => {
                scope.fail(&e.to_string());
                Err(e)
            }
        }
    }

    fn create_backup_inner(
        &self,
        options: &BackupOptions,
        now: &NaiveDateTime,
    ) -> BackupResult<BackupReport> {
        let config = Config::load(&options.config_path).map_err(|e| {
            BackupError::config_error(
                format!(
                    "Failed to read configuration file: {}",
                    options.config_path.display()
                ),
                e,
            )
        })?;
        log_event(Event::ConfigLoaded);

        if let BackupMode::Automatic { directory } = &options.mode {
            ensure_auto_backup_dir(directory)?;
        }
        let target = resolve_target(&options.mode, now);

        let staging = StagingWorkspace::create(options.staging_root.as_deref())
            .map_err(|e| BackupError::io_error("Failed to create staging directory", e))?;

        let dump_path = staging.path().join(DUMP_FILE_NAME);
        self.database
            .dump(&ConnectionParams::from_config(&config), &dump_path)
            .map_err(|e| BackupError::dependency_failed("Database backup command failed", e))?;
        log_event(Event::DatabaseDumped);

        let staged_config = staging.path().join(CONFIG_FILE_NAME);
        stage_config(&options.config_path, &staged_config)?;

        let mut sources = vec![ArchiveSource::new(vec![staged_config, dump_path], "")];
        if !target.db_only {
            let data_dir = config.data_directory();
            let children = list_dir(data_dir).map_err(|e| {
                BackupError::io_failed(format!(
                    "Failed to list data directory {}: {}",
                    data_dir.display(),
                    e.message()
                ))
            })?;
            sources.push(ArchiveSource::new(children, DATA_ARCHIVE_DIR));
        }

        let summary = write_archive(&target.path, &sources)?;
        let path = target.path.display().to_string();
        log_event_with_fields(Event::ArchiveCreated, &[("path", path.as_str())]);

        staging.close();

        Ok(BackupReport {
            path: target.path,
            db_only: target.db_only,
            files: summary.files,
            bytes: summary.bytes,
        })
    }
}

/// Copy the configuration document into the workspace with owner-only access
fn stage_config(src: &Path, dst: &Path) -> BackupResult<()> {
    let bytes = fs::read(src).map_err(|e| {
        BackupError::io_error(
            format!("Failed to read configuration file: {}", src.display()),
            e,
        )
    })?;

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(STAGED_CONFIG_MODE)
        .open(dst)
        .map_err(|e| BackupError::io_error_at_path(dst, e))?;

    file.write_all(&bytes)
        .map_err(|e| BackupError::io_error_at_path(dst, e))
}
