//! Gzip-compressed tar archive creation for backup
//!
//! - Only regular files are written as entries; directories are implied by
//!   the entry paths
//! - Children of a directory are archived in file-name order, so two runs
//!   over the same tree produce the same entry sequence
//! - Each entry keeps its size, permission bits and modification time
//! - A file that changes size while being read fails the archive
//! - The archive is written to a sibling temp file and renamed over the
//!   target only once complete, so a failure never touches the target

use std::fs::{self, File, Metadata};
use std::io::{self, BufWriter, Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Builder, EntryType, Header};
use tempfile::NamedTempFile;

use super::errors::{BackupError, BackupResult};
use crate::observability::{log_event_with_fields, Event};

/// A list of filesystem roots archived under a common prefix
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    pub roots: Vec<PathBuf>,
    /// Directory inside the archive; empty for the archive root
    pub prefix: String,
}

impl ArchiveSource {
    pub fn new(roots: Vec<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            roots,
            prefix: prefix.into(),
        }
    }
}

/// Totals for a written archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub files: u64,
    pub bytes: u64,
}

/// Streaming archive writer over any output
pub struct ArchiveWriter<W: Write> {
    builder: Builder<GzEncoder<W>>,
    summary: ArchiveSummary,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            builder: Builder::new(GzEncoder::new(writer, Compression::default())),
            summary: ArchiveSummary::default(),
        }
    }

    /// Archive every regular file reachable from `roots` at
    /// `prefix/<path relative to the root's parent>`
    pub fn append_roots(&mut self, roots: &[PathBuf], prefix: &str) -> BackupResult<()> {
        for root in roots {
            self.append_path(root, Path::new(prefix))?;
            let root_name = root.display().to_string();
            log_event_with_fields(
                Event::ArchiveRootAdded,
                &[("root", root_name.as_str()), ("prefix", prefix)],
            );
        }
        Ok(())
    }

    fn append_path(&mut self, path: &Path, prefix: &Path) -> BackupResult<()> {
        let name = path.file_name().ok_or_else(|| {
            BackupError::io_failed(format!(
                "Cannot archive a path without a file name: {}",
                path.display()
            ))
        })?;
        let archive_path = prefix.join(name);

        // Follows symlinks: a link is archived as whatever it points to
        let metadata = fs::metadata(path).map_err(|e| BackupError::io_error_at_path(path, e))?;

        if metadata.is_dir() {
            for child in list_dir(path)? {
                self.append_path(&child, &archive_path)?;
            }
            Ok(())
        } else if metadata.is_file() {
            self.append_file(path, &archive_path)
        } else {
            Err(BackupError::io_failed(format!(
                "Unsupported file type, only regular files and directories can be archived: {}",
                path.display()
            )))
        }
    }

    fn append_file(&mut self, path: &Path, archive_path: &Path) -> BackupResult<()> {
        let file = File::open(path).map_err(|e| BackupError::io_error_at_path(path, e))?;
        let metadata = file
            .metadata()
            .map_err(|e| BackupError::io_error_at_path(path, e))?;

        let mut header = file_header(&metadata);
        self.append_entry(&mut header, archive_path, path, file)
    }

    /// Append one entry whose contents must be exactly `header.size()` bytes
    fn append_entry<R: Read>(
        &mut self,
        header: &mut Header,
        archive_path: &Path,
        source: &Path,
        reader: R,
    ) -> BackupResult<()> {
        let size = header.size().map_err(|e| BackupError::io_error_at_path(source, e))?;
        let reader = SizedReader {
            inner: reader,
            remaining: size,
        };

        self.builder
            .append_data(header, archive_path, reader)
            .map_err(|e| {
                BackupError::io_error(
                    format!(
                        "Failed to add file to archive: {} (from {})",
                        archive_path.display(),
                        source.display()
                    ),
                    e,
                )
            })?;

        self.summary.files += 1;
        self.summary.bytes += size;
        Ok(())
    }

    pub fn summary(&self) -> ArchiveSummary {
        self.summary
    }

    /// Write the tar trailer and gzip footer, returning the inner writer
    pub fn finish(self) -> BackupResult<W> {
        let encoder = self
            .builder
            .into_inner()
            .map_err(|e| BackupError::io_error("Failed to finish archive", e))?;

        encoder
            .finish()
            .map_err(|e| BackupError::io_error("Failed to finish archive compression", e))
    }
}

/// Reads at most `remaining` bytes and fails if the source ends sooner
struct SizedReader<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> Read for SizedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let max = usize::try_from(self.remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let n = self.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file shrank while archiving, {} bytes missing", self.remaining),
            ));
        }

        self.remaining -= n as u64;
        Ok(n)
    }
}

fn file_header(metadata: &Metadata) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(metadata.len());
    header.set_mode(metadata.permissions().mode() & 0o7777);

    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    header.set_mtime(mtime);
    header
}

/// Directory children in file-name order
pub fn list_dir(dir: &Path) -> BackupResult<Vec<PathBuf>> {
    let mut children = fs::read_dir(dir)
        .map_err(|e| BackupError::io_error_at_path(dir, e))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| BackupError::io_error_at_path(dir, e))?;

    children.sort();
    Ok(children)
}

/// Write a complete archive to `output`.
///
/// The archive is built in a temp file next to `output` and renamed over it
/// after fsync. On failure the temp file is removed and an existing file at
/// `output` is left as it was.
pub fn write_archive(output: &Path, sources: &[ArchiveSource]) -> BackupResult<ArchiveSummary> {
    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let temp = tempfile::Builder::new()
        .prefix(&format!(".{}.", name))
        .suffix(".partial")
        .tempfile_in(parent)
        .map_err(|e| {
            BackupError::io_error(
                format!("Failed to create archive file: {}", output.display()),
                e,
            )
        })?;
    let temp_path = temp.path().display().to_string();

    let result = write_archive_to(BufWriter::new(temp), sources, output);
    if result.is_err() {
        log_event_with_fields(Event::ArchiveDiscarded, &[("path", temp_path.as_str())]);
    }
    result
}

fn write_archive_to(
    writer: BufWriter<NamedTempFile>,
    sources: &[ArchiveSource],
    output: &Path,
) -> BackupResult<ArchiveSummary> {
    let mut archive = ArchiveWriter::new(writer);
    for source in sources {
        archive.append_roots(&source.roots, &source.prefix)?;
    }
    let summary = archive.summary();

    let writer = archive.finish()?;
    let temp = writer
        .into_inner()
        .map_err(|e| BackupError::io_error("Failed to flush archive buffer", e.into_error()))?;

    temp.as_file().sync_all().map_err(|e| {
        BackupError::io_error(
            format!("Failed to fsync archive: {}", output.display()),
            e,
        )
    })?;

    temp.persist(output).map_err(|e| {
        BackupError::io_error(
            format!("Failed to move archive into place: {}", output.display()),
            e.error,
        )
    })?;

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupErrorCode;
    use flate2::read::GzDecoder;
    use std::os::unix::fs::symlink;
    use tar::Archive;
    use tempfile::TempDir;

    fn write_file(path: &Path, contents: &[u8], mode: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    fn create_data_tree(root: &Path) {
        write_file(&root.join("users").join("avatar.png"), b"png bytes", 0o640);
        write_file(
            &root.join("plugins").join("com.example").join("plugin.json"),
            br#"{"id":"com.example"}"#,
            0o600,
        );
        write_file(&root.join("top.txt"), b"top", 0o644);
    }

    fn entry_list(archive_path: &Path) -> Vec<(String, u32, u64, EntryType)> {
        let file = File::open(archive_path).unwrap();
        let mut archive = Archive::new(GzDecoder::new(file));

        archive
            .entries()
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                let header = e.header();
                (
                    e.path().unwrap().to_string_lossy().to_string(),
                    header.mode().unwrap(),
                    header.size().unwrap(),
                    header.entry_type(),
                )
            })
            .collect()
    }

    #[test]
    fn test_archive_prefixes_and_relative_paths() {
        let temp_dir = TempDir::new().unwrap();
        let data = temp_dir.path().join("data");
        create_data_tree(&data);
        let config = temp_dir.path().join("mmomni.yml");
        write_file(&config, b"db_user: mmuser\n", 0o600);

        let archive_path = temp_dir.path().join("backup.tgz");
        let summary = write_archive(
            &archive_path,
            &[
                ArchiveSource::new(vec![config], ""),
                ArchiveSource::new(list_dir(&data).unwrap(), "data"),
            ],
        )
        .unwrap();

        let names: Vec<String> = entry_list(&archive_path)
            .into_iter()
            .map(|(name, ..)| name)
            .collect();

        assert_eq!(
            names,
            vec![
                "mmomni.yml",
                "data/plugins/com.example/plugin.json",
                "data/top.txt",
                "data/users/avatar.png",
            ]
        );
        assert_eq!(summary.files, 4);
    }

    #[test]
    fn test_archive_only_regular_file_entries() {
        let temp_dir = TempDir::new().unwrap();
        let data = temp_dir.path().join("data");
        create_data_tree(&data);

        let archive_path = temp_dir.path().join("backup.tgz");
        write_archive(
            &archive_path,
            &[ArchiveSource::new(list_dir(&data).unwrap(), "data")],
        )
        .unwrap();

        for (name, _, _, kind) in entry_list(&archive_path) {
            assert_eq!(kind, EntryType::Regular, "{} is not a regular entry", name);
        }
    }

    #[test]
    fn test_archive_preserves_mode_and_size() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("database.dump");
        write_file(&file, b"0123456789", 0o600);

        let archive_path = temp_dir.path().join("backup.tgz");
        write_archive(&archive_path, &[ArchiveSource::new(vec![file], "")]).unwrap();

        let entries = entry_list(&archive_path);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, 0o600);
        assert_eq!(entries[0].2, 10);
    }

    #[test]
    fn test_archive_follows_symlinked_files() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("real.txt");
        write_file(&target, b"linked", 0o644);
        let data = temp_dir.path().join("data");
        fs::create_dir_all(&data).unwrap();
        symlink(&target, data.join("link.txt")).unwrap();

        let archive_path = temp_dir.path().join("backup.tgz");
        write_archive(
            &archive_path,
            &[ArchiveSource::new(list_dir(&data).unwrap(), "data")],
        )
        .unwrap();

        let entries = entry_list(&archive_path);
        assert_eq!(entries[0].0, "data/link.txt");
        assert_eq!(entries[0].3, EntryType::Regular);
        assert_eq!(entries[0].2, 6);
    }

    #[test]
    fn test_archive_deterministic() {
        let temp_dir = TempDir::new().unwrap();
        let data = temp_dir.path().join("data");
        create_data_tree(&data);
        let sources = [ArchiveSource::new(list_dir(&data).unwrap(), "data")];

        let first = temp_dir.path().join("backup1.tgz");
        let second = temp_dir.path().join("backup2.tgz");
        write_archive(&first, &sources).unwrap();
        write_archive(&second, &sources).unwrap();

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn test_missing_root_fails_and_removes_partial_archive() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("backup.tgz");

        let result = write_archive(
            &archive_path,
            &[ArchiveSource::new(
                vec![temp_dir.path().join("does-not-exist")],
                "",
            )],
        );

        let err = result.unwrap_err();
        assert!(err.to_string().contains("does-not-exist"));
        assert!(!archive_path.exists());
    }

    #[test]
    fn test_failed_archive_keeps_existing_output() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("backup.tgz");
        fs::write(&archive_path, b"previous backup").unwrap();

        let result = write_archive(
            &archive_path,
            &[ArchiveSource::new(
                vec![temp_dir.path().join("does-not-exist")],
                "",
            )],
        );

        assert!(result.is_err());
        assert_eq!(fs::read(&archive_path).unwrap(), b"previous backup");
        // No temp file left behind
        assert_eq!(list_dir(temp_dir.path()).unwrap(), vec![archive_path]);
    }

    #[test]
    fn test_successful_archive_replaces_existing_output() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("database.dump");
        write_file(&file, b"dump", 0o600);
        let archive_path = temp_dir.path().join("backup.tgz");
        fs::write(&archive_path, b"previous backup").unwrap();

        write_archive(&archive_path, &[ArchiveSource::new(vec![file.clone()], "")]).unwrap();

        let entries = entry_list(&archive_path);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "database.dump");
        assert_eq!(list_dir(temp_dir.path()).unwrap(), vec![archive_path, file]);
    }

    #[test]
    fn test_short_read_fails_entry() {
        let mut writer = ArchiveWriter::new(Vec::new());
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(10);
        header.set_mode(0o600);

        let source = Path::new("/var/lib/mattermost/shrinking.log");
        let err = writer
            .append_entry(
                &mut header,
                Path::new("data/shrinking.log"),
                source,
                io::Cursor::new(b"abc".to_vec()),
            )
            .unwrap_err();

        assert_eq!(err.code(), BackupErrorCode::MmoBackupIo);
        assert!(err.to_string().contains("shrinking.log"));
        assert!(err.to_string().contains("7 bytes missing"));
        assert_eq!(writer.summary(), ArchiveSummary::default());
    }

    #[test]
    fn test_long_source_is_truncated_to_header_size() {
        let mut writer = ArchiveWriter::new(Vec::new());
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(3);
        header.set_mode(0o600);

        writer
            .append_entry(
                &mut header,
                Path::new("growing.log"),
                Path::new("growing.log"),
                io::Cursor::new(b"abcdef".to_vec()),
            )
            .unwrap();
        let bytes = writer.finish().unwrap();

        let mut archive = Archive::new(GzDecoder::new(bytes.as_slice()));
        let mut entry = archive.entries().unwrap().next().unwrap().unwrap();
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "abc");
    }

    #[test]
    fn test_unwritable_output_fails() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("missing-dir").join("backup.tgz");

        let err = write_archive(&archive_path, &[]).unwrap_err();
        assert!(err.message().contains("Failed to create archive file"));
    }

    #[test]
    fn test_writer_into_memory() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("database.dump");
        write_file(&file, b"dump", 0o600);

        let mut writer = ArchiveWriter::new(Vec::new());
        writer.append_roots(&[file], "").unwrap();
        let bytes = writer.finish().unwrap();

        let mut archive = Archive::new(GzDecoder::new(bytes.as_slice()));
        let mut entry = archive.entries().unwrap().next().unwrap().unwrap();
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "dump");
    }
}
