//! Archive extraction for restore
//!
//! Entries are read sequentially from a gzip-compressed tar stream and
//! recreated under the staging directory:
//!
//! - Directory entries are created and given the entry's permission bits
//! - Regular files get their parent (mode 0750), permission bits, contents and mtime
//! - Any other entry kind stops extraction with a format error
//! - Absolute paths and `..` components are rejected; nothing is written outside `dest`

use std::fs::{self, DirBuilder, File, OpenOptions, Permissions};
use std::io::{self, BufReader, ErrorKind, Read};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use flate2::read::GzDecoder;
use tar::{Archive, Entry, EntryType};

use super::errors::{RestoreError, RestoreResult};

const STAGED_PARENT_MODE: u32 = 0o750;

/// Counts of what an extraction produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: u64,
    pub directories: u64,
    pub bytes: u64,
}

/// Extract a backup archive file into `dest`
pub fn extract_archive_file(archive_path: &Path, dest: &Path) -> RestoreResult<ExtractSummary> {
    let file = File::open(archive_path).map_err(|e| {
        RestoreError::io_error(
            format!("Failed to open backup archive: {}", archive_path.display()),
            e,
        )
    })?;

    extract_archive(BufReader::new(file), dest)
}

/// Extract a gzip-compressed tar stream into `dest`
pub fn extract_archive<R: Read>(reader: R, dest: &Path) -> RestoreResult<ExtractSummary> {
    let mut archive = Archive::new(GzDecoder::new(reader));
    let entries = archive.entries().map_err(|e| {
        RestoreError::invalid_backup_with_source("Failed to read backup archive", e)
    })?;

    let mut summary = ExtractSummary::default();

    for entry in entries {
        let mut entry = entry.map_err(|e| {
            RestoreError::invalid_backup_with_source("Failed to read backup archive entry", e)
        })?;
        let relative = entry_path(&entry)?;
        let target = dest.join(&relative);
        let entry_type = entry.header().entry_type();

        if entry_type.is_dir() {
            extract_dir(&entry, &target)?;
            summary.directories += 1;
        } else if entry_type.is_file() {
            summary.bytes += extract_file(&mut entry, &target)?;
            summary.files += 1;
        } else {
            return Err(RestoreError::invalid_backup(format!(
                "Unsupported entry kind {} at {}",
                entry_kind(entry_type),
                relative.display()
            )));
        }
    }

    Ok(summary)
}

/// Relative path of an entry, rejecting anything that would escape the destination
fn entry_path<R: Read>(entry: &Entry<'_, R>) -> RestoreResult<PathBuf> {
    let path = entry.path().map_err(|e| {
        RestoreError::invalid_backup_with_source("Invalid entry path in backup archive", e)
    })?;

    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(RestoreError::invalid_backup(format!(
                    "Entry path escapes the staging directory: {}",
                    path.display()
                )));
            }
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(RestoreError::invalid_backup(format!(
            "Empty entry path in backup archive: {:?}",
            path
        )));
    }

    Ok(relative)
}

fn entry_mode<R: Read>(entry: &Entry<'_, R>, target: &Path) -> RestoreResult<u32> {
    entry
        .header()
        .mode()
        .map(|mode| mode & 0o7777)
        .map_err(|e| {
            RestoreError::invalid_backup_with_source(
                format!("Invalid mode for entry {}", target.display()),
                e,
            )
        })
}

fn extract_dir<R: Read>(entry: &Entry<'_, R>, target: &Path) -> RestoreResult<()> {
    let mode = entry_mode(entry, target)?;

    fs::create_dir_all(target).map_err(|e| RestoreError::io_error_at_path(target, e))?;
    fs::set_permissions(target, Permissions::from_mode(mode))
        .map_err(|e| RestoreError::io_error_at_path(target, e))
}

fn extract_file<R: Read>(entry: &mut Entry<'_, R>, target: &Path) -> RestoreResult<u64> {
    let mode = entry_mode(entry, target)?;
    let mtime = entry.header().mtime().map_err(|e| {
        RestoreError::invalid_backup_with_source(
            format!("Invalid mtime for entry {}", target.display()),
            e,
        )
    })?;

    if let Some(parent) = target.parent() {
        if !parent.exists() {
            DirBuilder::new()
                .recursive(true)
                .mode(STAGED_PARENT_MODE)
                .create(parent)
                .map_err(|e| {
                    RestoreError::io_error(format!("Failed to create {}", parent.display()), e)
                })?;
        }
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(target)
        .map_err(|e| RestoreError::io_error_at_path(target, e))?;
    file.set_permissions(Permissions::from_mode(mode))
        .map_err(|e| RestoreError::io_error_at_path(target, e))?;

    let written = io::copy(entry, &mut file).map_err(|e| stream_error(target, e))?;

    file.set_modified(UNIX_EPOCH + Duration::from_secs(mtime))
        .map_err(|e| RestoreError::io_error_at_path(target, e))?;

    Ok(written)
}

/// A copy failure is either a corrupt stream or a staging write failure
fn stream_error(target: &Path, e: io::Error) -> RestoreError {
    match e.kind() {
        ErrorKind::InvalidData | ErrorKind::InvalidInput | ErrorKind::UnexpectedEof => {
            RestoreError::invalid_backup_with_source(
                format!("Corrupt archive data for {}", target.display()),
                e,
            )
        }
        _ => RestoreError::io_error_at_path(target, e),
    }
}

fn entry_kind(entry_type: EntryType) -> &'static str {
    match entry_type {
        EntryType::Symlink => "symlink",
        EntryType::Link => "hard link",
        EntryType::Char => "character device",
        EntryType::Block => "block device",
        EntryType::Fifo => "fifo",
        EntryType::Continuous => "contiguous file",
        EntryType::XGlobalHeader => "pax global header",
        _ => "unknown",
    }
}
