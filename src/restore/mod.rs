//! Restore subsystem for mmomni
//!
//! Restore reconstructs a host's configuration, database and data directory
//! from a backup archive.
//!
//! # Algorithm
//!
//! 1. Create a private staging workspace
//! 2. Extract the archive into it
//! 3. Verify `mmomni.yml` and `database.dump` are present
//! 4. Merge the restored configuration onto the host's and persist it
//! 5. Load the database dump
//! 6. Swap the staged `data/` tree into the configured data directory, if present
//! 7. Remove the workspace
//!
//! Nothing on the host is modified before step 4. A failure in step 5 or 6
//! leaves the already persisted configuration in place.
//!
//! # Important
//!
//! Restore does not apply the configuration to running services; the
//! operator runs `mmomni reconfigure` afterwards. Callers must not run two
//! restores, or a restore and a backup, concurrently on the same host.

mod errors;
mod extractor;
mod merger;
mod restorer;

pub use errors::{RestoreError, RestoreErrorCode, RestoreResult};
pub use extractor::{extract_archive, extract_archive_file, ExtractSummary};
pub use merger::{merge_restored_config, restore_config};
pub use restorer::{atomic_replace, fsync_dir, swap_data_directory, DataRestore};

use std::path::{Path, PathBuf};

use crate::backup::DATA_ARCHIVE_DIR;
use crate::config::CONFIG_FILE_NAME;
use crate::database::{ConnectionParams, DatabaseTool, DUMP_FILE_NAME};
use crate::observability::{log_event, log_event_with_fields, Event, ObservationScope};
use crate::staging::StagingWorkspace;

/// What to restore and onto which configuration
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    pub archive_path: PathBuf,
    /// Installed configuration document to merge into
    pub config_path: PathBuf,
    /// Parent of the staging workspace; the system temp directory if unset
    pub staging_root: Option<PathBuf>,
}

/// Outcome of a successful restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub config_path: PathBuf,
    pub data: DataRestore,
}

/// Restore manager for restoring from backup archives.
///
/// ```ignore
/// let manager = RestoreManager::new(PgTools::new());
/// let report = manager.restore_from_backup(&options)?;
/// ```
pub struct RestoreManager<D> {
    database: D,
}

impl<D: DatabaseTool> RestoreManager<D> {
    pub fn new(database: D) -> Self {
        Self { database }
    }

    /// Restore from a backup archive.
    ///
    /// # Errors
    ///
    /// - `MMO_RESTORE_FORMAT` if the archive is unreadable, has an unsupported
    ///   entry, an escaping path, or lacks a required file
    /// - `MMO_RESTORE_CONFIG` / `MMO_RESTORE_VALIDATION` if the configuration
    ///   cannot be merged; the host file is left untouched
    /// - `MMO_RESTORE_DEPENDENCY` if `pg_restore` fails
    /// - `MMO_RESTORE_IO` for any filesystem failure
    ///
    /// The staging workspace is removed on every path.
    pub fn restore_from_backup(&self, options: &RestoreOptions) -> RestoreResult<RestoreReport> {
        let archive = options.archive_path.display().to_string();
        let scope = ObservationScope::with_fields("RESTORE", &[("archive", archive.as_str())]);

        match self.restore_inner(options) {
            Ok(report) => {
                scope.complete();
                Ok(report)
            }
            Err(e) => {
                scope.fail(&e.to_string());
                Err(e)
            }
        }
    }

    fn restore_inner(&self, options: &RestoreOptions) -> RestoreResult<RestoreReport> {
        let staging = StagingWorkspace::create(options.staging_root.as_deref())
            .map_err(|e| RestoreError::io_error("Failed to create staging directory", e))?;

        let summary = extract_archive_file(&options.archive_path, staging.path())?;
        let files = summary.files.to_string();
        log_event_with_fields(Event::ArchiveExtracted, &[("files", files.as_str())]);

        let extracted_config = staging.path().join(CONFIG_FILE_NAME);
        let dump = staging.path().join(DUMP_FILE_NAME);
        require_entry(&extracted_config, CONFIG_FILE_NAME)?;
        require_entry(&dump, DUMP_FILE_NAME)?;

        let config = restore_config(&options.config_path, &extracted_config)?;
        log_event(Event::ConfigRestored);

        self.database
            .restore(&ConnectionParams::from_config(&config), &dump)
            .map_err(|e| RestoreError::dependency_failed("Database restore command failed", e))?;
        log_event(Event::DatabaseRestored);

        let data = swap_data_directory(
            &staging.path().join(DATA_ARCHIVE_DIR),
            config.data_directory(),
        )?;
        match &data {
            DataRestore::Skipped => log_event(Event::DataDirectorySkipped),
            DataRestore::Restored { path } => {
                let path = path.display().to_string();
                log_event_with_fields(Event::DataDirectoryRestored, &[("path", path.as_str())]);
            }
        }

        staging.close();

        Ok(RestoreReport {
            config_path: options.config_path.clone(),
            data,
        })
    }
}

fn require_entry(path: &Path, name: &str) -> RestoreResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(RestoreError::invalid_backup(format!(
            "Backup archive does not contain {}",
            name
        )))
    }
}
