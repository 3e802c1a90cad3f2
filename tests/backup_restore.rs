//! Backup/Restore Round-Trip Tests
//!
//! Tests for:
//! - Round trip: restored data tree matches the backed-up one
//! - Credential preservation: the restoring host keeps its database user and password
//! - Skip-on-missing-data: database-only archives leave the data directory alone
//! - Format rejection: unsupported entries stop restore before any host change
//! - Staging cleanup: no workspace survives a failed operation

use chrono::{NaiveDate, NaiveDateTime};
use flate2::write::GzEncoder;
use flate2::Compression;
use mmomni::backup::{BackupErrorCode, BackupManager, BackupMode, BackupOptions};
use mmomni::config::Config;
use mmomni::database::{ConnectionParams, DatabaseResult, DatabaseTool};
use mmomni::restore::{DataRestore, RestoreErrorCode, RestoreManager, RestoreOptions};
use std::cell::RefCell;
use std::fs::{self, File};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tar::{Builder, EntryType, Header};
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

/// Stands in for pg_dump/pg_restore: the "database" is a byte string.
struct FakeDatabase {
    contents: RefCell<Vec<u8>>,
    restored_as: RefCell<Vec<String>>,
}

impl FakeDatabase {
    fn with_contents(contents: &[u8]) -> Self {
        Self {
            contents: RefCell::new(contents.to_vec()),
            restored_as: RefCell::new(Vec::new()),
        }
    }
}

impl DatabaseTool for FakeDatabase {
    fn dump(&self, _conn: &ConnectionParams, output: &Path) -> DatabaseResult<()> {
        fs::write(output, &*self.contents.borrow()).unwrap();
        Ok(())
    }

    fn restore(&self, conn: &ConnectionParams, dump: &Path) -> DatabaseResult<()> {
        *self.contents.borrow_mut() = fs::read(dump).unwrap();
        self.restored_as.borrow_mut().push(conn.user.clone());
        Ok(())
    }
}

struct Host {
    root: TempDir,
    config_path: PathBuf,
    data_dir: PathBuf,
    staging_root: PathBuf,
}

impl Host {
    fn new(db_user: &str, db_password: &str, fqdn: &str) -> Self {
        let root = TempDir::new().expect("Failed to create temp dir");
        let data_dir = root.path().join("opt").join("data");
        fs::create_dir_all(&data_dir).unwrap();

        let config_path = root.path().join("etc").join("mmomni.yml");
        Config {
            db_user: Some(db_user.to_string()),
            db_password: Some(db_password.to_string()),
            fqdn: Some(fqdn.to_string()),
            data_directory: Some(data_dir.display().to_string()),
            ..Config::default()
        }
        .with_defaults()
        .save(&config_path)
        .unwrap();

        let staging_root = root.path().join("tmp");
        fs::create_dir_all(&staging_root).unwrap();

        Self {
            root,
            config_path,
            data_dir,
            staging_root,
        }
    }

    fn backup_options(&self, output: &Path, db_only: bool) -> BackupOptions {
        BackupOptions {
            config_path: self.config_path.clone(),
            mode: BackupMode::Manual {
                output: Some(output.to_path_buf()),
                db_only,
            },
            staging_root: Some(self.staging_root.clone()),
        }
    }

    fn restore_options(&self, archive: &Path) -> RestoreOptions {
        RestoreOptions {
            archive_path: archive.to_path_buf(),
            config_path: self.config_path.clone(),
            staging_root: Some(self.staging_root.clone()),
        }
    }

    fn staging_is_empty(&self) -> bool {
        fs::read_dir(&self.staging_root).unwrap().next().is_none()
    }
}

fn write_file(path: &Path, contents: &[u8], mode: u32, mtime: u64) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(UNIX_EPOCH + Duration::from_secs(mtime))
        .unwrap();
}

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(3, 0, 0)
        .unwrap()
}

fn mode_of(path: &Path) -> u32 {
    fs::metadata(path).unwrap().permissions().mode() & 0o7777
}

// =============================================================================
// Round Trip
// =============================================================================

#[test]
fn test_round_trip_restores_data_tree() {
    let source = Host::new("mmuser", "sourcepw", "chat.source.example");
    write_file(
        &source.data_dir.join("users").join("u1").join("avatar.png"),
        b"avatar bytes",
        0o640,
        1_600_000_000,
    );
    write_file(
        &source.data_dir.join("plugins").join("com.example.plugin.tar.gz"),
        b"plugin bytes",
        0o600,
        1_650_000_000,
    );
    let archive = source.root.path().join("backup.tgz");

    let backup_db = FakeDatabase::with_contents(b"source database");
    let report = BackupManager::new(&backup_db)
        .create_backup(&source.backup_options(&archive, false), now())
        .unwrap();
    assert_eq!(report.files, 4);

    let target = Host::new("targetuser", "targetpw", "chat.target.example");
    write_file(&target.data_dir.join("stale.txt"), b"stale", 0o644, 1);
    let restore_db = FakeDatabase::with_contents(b"target database");

    let outcome = RestoreManager::new(&restore_db)
        .restore_from_backup(&target.restore_options(&archive))
        .unwrap();

    // The restored config points at the source's data directory
    let restored = Config::load(&target.config_path).unwrap();
    assert_eq!(restored.data_directory(), source.data_dir.as_path());
    assert_eq!(
        outcome.data,
        DataRestore::Restored {
            path: source.data_dir.clone()
        }
    );

    let avatar = source.data_dir.join("users").join("u1").join("avatar.png");
    assert_eq!(fs::read(&avatar).unwrap(), b"avatar bytes");
    assert_eq!(mode_of(&avatar), 0o640);
    assert_eq!(
        fs::metadata(&avatar).unwrap().modified().unwrap(),
        UNIX_EPOCH + Duration::from_secs(1_600_000_000)
    );
    let plugin = source
        .data_dir
        .join("plugins")
        .join("com.example.plugin.tar.gz");
    assert_eq!(mode_of(&plugin), 0o600);

    assert_eq!(&*restore_db.contents.borrow(), b"source database");
    assert!(source.staging_is_empty());
    assert!(target.staging_is_empty());
}

#[test]
fn test_restore_preserves_host_credentials() {
    let source = Host::new("sourceuser", "sourcepw", "chat.source.example");
    let archive = source.root.path().join("backup.tgz");
    BackupManager::new(FakeDatabase::with_contents(b"db"))
        .create_backup(&source.backup_options(&archive, true), now())
        .unwrap();

    let target = Host::new("targetuser", "targetpw", "chat.target.example");
    let restore_db = FakeDatabase::with_contents(b"");
    RestoreManager::new(&restore_db)
        .restore_from_backup(&target.restore_options(&archive))
        .unwrap();

    let restored = Config::load(&target.config_path).unwrap();
    assert_eq!(restored.db_user(), "targetuser");
    assert_eq!(restored.db_password(), "targetpw");
    assert_eq!(restored.fqdn(), "chat.source.example");
    assert_eq!(*restore_db.restored_as.borrow(), vec!["targetuser".to_string()]);
}

#[test]
fn test_db_only_archive_skips_data_directory() {
    let source = Host::new("mmuser", "pw", "chat.example");
    write_file(&source.data_dir.join("file.txt"), b"source", 0o644, 1);
    let archive = source.root.path().join("dbonly.tgz");
    BackupManager::new(FakeDatabase::with_contents(b"db"))
        .create_backup(&source.backup_options(&archive, true), now())
        .unwrap();

    // Overwrite the data after the backup; a skipped swap must not touch it
    write_file(&source.data_dir.join("file.txt"), b"changed", 0o644, 2);

    let outcome = RestoreManager::new(FakeDatabase::with_contents(b""))
        .restore_from_backup(&source.restore_options(&archive))
        .unwrap();

    assert_eq!(outcome.data, DataRestore::Skipped);
    assert_eq!(fs::read(source.data_dir.join("file.txt")).unwrap(), b"changed");
}

#[test]
fn test_full_backup_then_restore_is_destructive() {
    let host = Host::new("mmuser", "pw", "chat.example");
    write_file(&host.data_dir.join("kept.txt"), b"kept", 0o644, 1);
    let archive = host.root.path().join("full.tgz");
    BackupManager::new(FakeDatabase::with_contents(b"db"))
        .create_backup(&host.backup_options(&archive, false), now())
        .unwrap();

    write_file(&host.data_dir.join("added_later.txt"), b"later", 0o644, 2);

    RestoreManager::new(FakeDatabase::with_contents(b""))
        .restore_from_backup(&host.restore_options(&archive))
        .unwrap();

    assert!(host.data_dir.join("kept.txt").exists());
    assert!(!host.data_dir.join("added_later.txt").exists());
}

// =============================================================================
// Failure Paths
// =============================================================================

#[test]
fn test_unsupported_entry_rejected_before_host_changes() {
    let host = Host::new("mmuser", "pw", "chat.example");
    write_file(&host.data_dir.join("live.txt"), b"live", 0o644, 1);
    let config_before = fs::read(&host.config_path).unwrap();

    let archive = host.root.path().join("symlink.tgz");
    {
        let mut builder = Builder::new(GzEncoder::new(
            File::create(&archive).unwrap(),
            Compression::default(),
        ));
        let config = b"fqdn: chat.other.example\n";
        let mut header = Header::new_gnu();
        header.set_size(config.len() as u64);
        header.set_mode(0o600);
        header.set_entry_type(EntryType::Regular);
        builder
            .append_data(&mut header, "mmomni.yml", &config[..])
            .unwrap();

        let mut link = Header::new_gnu();
        link.set_size(0);
        link.set_mode(0o777);
        link.set_entry_type(EntryType::Symlink);
        link.set_link_name("/etc/shadow").unwrap();
        builder
            .append_data(&mut link, "data/evil", std::io::empty())
            .unwrap();

        let mut dump = Header::new_gnu();
        dump.set_size(2);
        dump.set_mode(0o644);
        dump.set_entry_type(EntryType::Regular);
        builder
            .append_data(&mut dump, "database.dump", &b"db"[..])
            .unwrap();

        builder.into_inner().unwrap().finish().unwrap();
    }

    let restore_db = FakeDatabase::with_contents(b"untouched");
    let err = RestoreManager::new(&restore_db)
        .restore_from_backup(&host.restore_options(&archive))
        .unwrap_err();

    assert_eq!(err.code(), RestoreErrorCode::MmoRestoreFormat);
    assert!(err.message().contains("data/evil"));
    assert_eq!(fs::read(&host.config_path).unwrap(), config_before);
    assert_eq!(&*restore_db.contents.borrow(), b"untouched");
    assert_eq!(fs::read(host.data_dir.join("live.txt")).unwrap(), b"live");
    assert!(host.staging_is_empty());
}

#[test]
fn test_corrupt_archive_is_format_error() {
    let host = Host::new("mmuser", "pw", "chat.example");
    let archive = host.root.path().join("corrupt.tgz");
    fs::write(&archive, b"\x1f\x8b\x08\x00garbage that is not deflate").unwrap();

    let err = RestoreManager::new(FakeDatabase::with_contents(b""))
        .restore_from_backup(&host.restore_options(&archive))
        .unwrap_err();

    assert_eq!(err.code(), RestoreErrorCode::MmoRestoreFormat);
    assert!(host.staging_is_empty());
}

#[test]
fn test_backup_of_missing_data_directory_leaves_nothing_behind() {
    let host = Host::new("mmuser", "pw", "chat.example");
    fs::remove_dir_all(&host.data_dir).unwrap();
    let archive = host.root.path().join("never.tgz");

    let err = BackupManager::new(FakeDatabase::with_contents(b"db"))
        .create_backup(&host.backup_options(&archive, false), now())
        .unwrap_err();

    assert_eq!(err.code(), BackupErrorCode::MmoBackupIo);
    assert!(!archive.exists());
    assert!(host.staging_is_empty());
}
