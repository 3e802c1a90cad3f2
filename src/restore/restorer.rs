//! Data directory replacement for restore
//!
//! The staged tree is first brought next to the destination as
//! `<data>.restore_tmp`, so the final step is a same-filesystem rename:
//!
//! 1. Move staged tree → `<data>.restore_tmp` (copy if rename crosses filesystems)
//! 2. Move `<data>` → `<data>.old`
//! 3. Move `<data>.restore_tmp` → `<data>` (roll back step 2 on failure)
//! 4. fsync parent directory
//! 5. Delete `<data>.old`
//!
//! Either the old or the new data directory is in place at every point.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::observability::Logger;

use super::errors::{RestoreError, RestoreResult};

/// What happened to the data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataRestore {
    /// The archive carried no data tree; the live directory was left alone
    Skipped,
    /// The live directory now holds the archive's data tree
    Restored { path: PathBuf },
}

/// Replace `dest` with the tree staged at `staged`.
///
/// A missing `staged` directory is a no-op reported as [`DataRestore::Skipped`].
pub fn swap_data_directory(staged: &Path, dest: &Path) -> RestoreResult<DataRestore> {
    if !exists(staged)? {
        return Ok(DataRestore::Skipped);
    }

    let temp_dir = sibling_path(dest, "restore_tmp")?;
    if exists(&temp_dir)? {
        fs::remove_dir_all(&temp_dir).map_err(|e| {
            RestoreError::io_error(
                format!(
                    "Failed to clean up existing temp directory: {}",
                    temp_dir.display()
                ),
                e,
            )
        })?;
    }

    if let Err(e) = move_into_place(staged, &temp_dir) {
        cleanup_temp_dir(&temp_dir);
        return Err(e);
    }

    if let Err(e) = atomic_replace(dest, &temp_dir) {
        cleanup_temp_dir(&temp_dir);
        return Err(e);
    }

    Ok(DataRestore::Restored {
        path: dest.to_path_buf(),
    })
}

/// Move `src` to `dst`, falling back to a recursive copy when rename fails
fn move_into_place(src: &Path, dst: &Path) -> RestoreResult<()> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    copy_dir_recursive(src, dst)?;
    fsync_dir(dst)
}

/// Atomically replace `data_dir` with `new_dir`, which must be its sibling
pub fn atomic_replace(data_dir: &Path, new_dir: &Path) -> RestoreResult<()> {
    let parent = parent_dir(data_dir);

    if !exists(data_dir)? {
        fs::rename(new_dir, data_dir).map_err(|e| {
            RestoreError::io_error(
                format!(
                    "Failed to move {} to {}",
                    new_dir.display(),
                    data_dir.display()
                ),
                e,
            )
        })?;
        return fsync_dir(parent);
    }

    let old_dir = sibling_path(data_dir, "old")?;
    if exists(&old_dir)? {
        fs::remove_dir_all(&old_dir).map_err(|e| {
            RestoreError::io_error(format!("Failed to remove stale {}", old_dir.display()), e)
        })?;
    }

    fs::rename(data_dir, &old_dir).map_err(|e| {
        RestoreError::io_error(
            format!(
                "Failed to move {} to {}",
                data_dir.display(),
                old_dir.display()
            ),
            e,
        )
    })?;

    if let Err(e) = fs::rename(new_dir, data_dir) {
        let rollback = fs::rename(&old_dir, data_dir);
        let outcome = if rollback.is_ok() {
            "rolled back"
        } else {
            "rollback failed, previous data left at the .old path"
        };
        return Err(RestoreError::io_error(
            format!(
                "Failed to move {} to {} ({})",
                new_dir.display(),
                data_dir.display(),
                outcome
            ),
            e,
        ));
    }

    fsync_dir(parent)?;

    if let Err(e) = fs::remove_dir_all(&old_dir) {
        let path = old_dir.display().to_string();
        let reason = e.to_string();
        Logger::warn(
            "DATA_DIRECTORY_OLD_CLEANUP_FAILED",
            &[("path", path.as_str()), ("reason", reason.as_str())],
        );
    }

    Ok(())
}

/// `<dir>.<suffix>` next to `dir`
fn sibling_path(dir: &Path, suffix: &str) -> RestoreResult<PathBuf> {
    let name = dir.file_name().ok_or_else(|| {
        RestoreError::io_error(
            format!("Invalid data directory name: {}", dir.display()),
            io::Error::from(io::ErrorKind::InvalidInput),
        )
    })?;

    Ok(parent_dir(dir).join(format!("{}.{}", name.to_string_lossy(), suffix)))
}

fn parent_dir(dir: &Path) -> &Path {
    match dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn exists(path: &Path) -> RestoreResult<bool> {
    path.try_exists()
        .map_err(|e| RestoreError::io_error_at_path(path, e))
}

fn cleanup_temp_dir(temp_dir: &Path) {
    if temp_dir.exists() {
        let _ = fs::remove_dir_all(temp_dir);
    }
}

/// fsync a directory
pub fn fsync_dir(dir: &Path) -> RestoreResult<()> {
    let d = OpenOptions::new()
        .read(true)
        .open(dir)
        .map_err(|e| RestoreError::io_error_at_path(dir, e))?;

    d.sync_all()
        .map_err(|e| RestoreError::io_error(format!("Failed to fsync {}", dir.display()), e))
}

/// Copy file contents and permission bits, then fsync
fn copy_file_with_fsync(src: &Path, dst: &Path) -> RestoreResult<()> {
    fs::copy(src, dst).map_err(|e| {
        RestoreError::io_error(
            format!("Failed to copy {} to {}", src.display(), dst.display()),
            e,
        )
    })?;

    let modified = fs::metadata(src)
        .and_then(|m| m.modified())
        .map_err(|e| RestoreError::io_error_at_path(src, e))?;

    let file = File::open(dst).map_err(|e| RestoreError::io_error_at_path(dst, e))?;
    file.set_modified(modified)
        .map_err(|e| RestoreError::io_error_at_path(dst, e))?;
    file.sync_all()
        .map_err(|e| RestoreError::io_error_at_path(dst, e))
}

/// Copy directory recursively with fsync, preserving permission bits
fn copy_dir_recursive(src: &Path, dst: &Path) -> RestoreResult<()> {
    fs::create_dir_all(dst)
        .map_err(|e| RestoreError::io_error(format!("Failed to create {}", dst.display()), e))?;

    let entries = fs::read_dir(src).map_err(|e| RestoreError::io_error_at_path(src, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| RestoreError::io_error_at_path(src, e))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| RestoreError::io_error_at_path(&src_path, e))?;

        if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            copy_file_with_fsync(&src_path, &dst_path)?;
        }
    }

    let permissions = fs::metadata(src)
        .map_err(|e| RestoreError::io_error_at_path(src, e))?
        .permissions();
    fs::set_permissions(dst, permissions).map_err(|e| RestoreError::io_error_at_path(dst, e))?;

    File::open(dst)
        .and_then(|d| d.sync_all())
        .map_err(|e| RestoreError::io_error(format!("Failed to fsync {}", dst.display()), e))
}
