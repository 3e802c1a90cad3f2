//! CLI command implementations
//!
//! Commands are thin: they build options, call into the backup/restore
//! managers and print the outcome on stdout. Log lines go to stderr.

use std::path::{Path, PathBuf};

use chrono::Local;
use rand::Rng;

use crate::backup::{BackupManager, BackupMode, BackupOptions, BackupReport};
use crate::config::secrets::{generate_db_password, parse_fqdn};
use crate::config::{Config, AUTO_BACKUP_DIR};
use crate::database::PgTools;
use crate::observability::{log_event_with_fields, Event};
use crate::restore::{DataRestore, RestoreManager, RestoreOptions, RestoreReport};

use super::args::{Cli, Command};
use super::errors::CliResult;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Backup {
            output,
            db_only,
            config,
            auto,
        } => {
            let mode = if auto {
                BackupMode::Automatic {
                    directory: PathBuf::from(AUTO_BACKUP_DIR),
                }
            } else {
                BackupMode::Manual { output, db_only }
            };
            let report = backup(&config, mode)?;
            println!("Backup created at {:?}", report.path);
        }
        Command::Restore { file, config } => {
            let report = restore(&config, &file)?;
            println!("Configuration restored in {:?}", report.config_path);
            println!("Database backup restored");
            match report.data {
                DataRestore::Skipped => {
                    println!("Backup doesn't contain a data directory, skipping...")
                }
                DataRestore::Restored { path } => {
                    println!("Data directory restored in {:?}", path)
                }
            }
            println!("\nPlease run \"mmomni reconfigure\" to apply the restored configuration");
        }
        Command::Init {
            fqdn,
            email,
            https,
            config,
        } => {
            init(&config, &fqdn, &email, https, &mut rand::thread_rng())?;
            println!("config file {:?} successfully saved", config);
        }
    }

    Ok(())
}

/// Create a backup using the system's `pg_dump`
pub fn backup(config_path: &Path, mode: BackupMode) -> CliResult<BackupReport> {
    let options = BackupOptions {
        config_path: config_path.to_path_buf(),
        mode,
        staging_root: None,
    };

    let manager = BackupManager::new(PgTools::new());
    Ok(manager.create_backup(&options, Local::now().naive_local())?)
}

/// Restore a backup using the system's `pg_restore`
pub fn restore(config_path: &Path, archive_path: &Path) -> CliResult<RestoreReport> {
    let options = RestoreOptions {
        archive_path: archive_path.to_path_buf(),
        config_path: config_path.to_path_buf(),
        staging_root: None,
    };

    let manager = RestoreManager::new(PgTools::new());
    Ok(manager.restore_from_backup(&options)?)
}

/// Write the initial configuration file.
///
/// An existing file is loaded like an installed configuration (defaults
/// backfilled, then validated) and only gets the identity fields updated;
/// an invalid one is an error and stays untouched. A new file starts from
/// defaults with a generated database password. The result is written
/// without validation so the operator can fix it up afterwards.
pub fn init<R: Rng + ?Sized>(
    config_path: &Path,
    fqdn: &str,
    email: &str,
    https: bool,
    rng: &mut R,
) -> CliResult<Config> {
    let mut config = if config_path.exists() {
        Config::load(config_path)?
    } else {
        let mut config = Config::default().with_defaults();
        config.db_password = Some(generate_db_password(rng));
        config.https = Some(https);
        config
    };

    config.fqdn = Some(parse_fqdn(fqdn).to_string());
    config.email = Some(email.to_string());
    config.enable_local_mode = Some(true);

    config.write_to_disk(config_path)?;

    let path = config_path.display().to_string();
    log_event_with_fields(Event::ConfigSaved, &[("path", path.as_str())]);

    Ok(config)
}
