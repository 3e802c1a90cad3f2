//! External database dump/restore tools
//!
//! The dump is opaque to mmomni: it is produced by `pg_dump` in custom
//! format, carried whole inside the archive, and handed back to
//! `pg_restore`. Only the exit status of the tools is interpreted.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use thiserror::Error;

use crate::config::{Config, DATABASE_NAME};

/// Name of the dump file inside the staging workspace and the archive
pub const DUMP_FILE_NAME: &str = "database.dump";

pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("cannot run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}")]
    Failed { command: String, status: ExitStatus },
}

/// Connection parameters handed to the dump tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub database: String,
    pub user: String,
    pub password: String,
    pub host: String,
    pub ssl_mode: String,
}

impl ConnectionParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            database: DATABASE_NAME.to_string(),
            user: config.db_user().to_string(),
            password: config.db_password().to_string(),
            host: config.db_host().to_string(),
            ssl_mode: config.db_use_ssl().to_string(),
        }
    }
}

/// Producer and consumer of database dumps
pub trait DatabaseTool {
    /// Write a dump of the database to `output`
    fn dump(&self, conn: &ConnectionParams, output: &Path) -> DatabaseResult<()>;

    /// Replace the database contents with the dump at `dump`
    fn restore(&self, conn: &ConnectionParams, dump: &Path) -> DatabaseResult<()>;
}

impl<T: DatabaseTool + ?Sized> DatabaseTool for &T {
    fn dump(&self, conn: &ConnectionParams, output: &Path) -> DatabaseResult<()> {
        (**self).dump(conn, output)
    }

    fn restore(&self, conn: &ConnectionParams, dump: &Path) -> DatabaseResult<()> {
        (**self).restore(conn, dump)
    }
}

/// PostgreSQL client tools found on `PATH` (or at explicit locations)
#[derive(Debug, Clone)]
pub struct PgTools {
    pg_dump: PathBuf,
    pg_restore: PathBuf,
}

impl Default for PgTools {
    fn default() -> Self {
        Self {
            pg_dump: PathBuf::from("pg_dump"),
            pg_restore: PathBuf::from("pg_restore"),
        }
    }
}

impl PgTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binaries(pg_dump: impl Into<PathBuf>, pg_restore: impl Into<PathBuf>) -> Self {
        Self {
            pg_dump: pg_dump.into(),
            pg_restore: pg_restore.into(),
        }
    }

    fn command(&self, program: &Path, conn: &ConnectionParams) -> Command {
        let mut cmd = Command::new(program);
        cmd.env("PGPASSWORD", &conn.password)
            .env("PGSSLMODE", &conn.ssl_mode);
        cmd
    }
}

fn run(mut cmd: Command, name: &Path) -> DatabaseResult<()> {
    let command = name.display().to_string();
    let status = cmd.status().map_err(|source| DatabaseError::Spawn {
        command: command.clone(),
        source,
    })?;

    if !status.success() {
        return Err(DatabaseError::Failed { command, status });
    }
    Ok(())
}

impl DatabaseTool for PgTools {
    fn dump(&self, conn: &ConnectionParams, output: &Path) -> DatabaseResult<()> {
        let mut cmd = self.command(&self.pg_dump, conn);
        cmd.arg(&conn.database)
            .arg("-Fc")
            .arg("-f")
            .arg(output)
            .args(["-w", "-U", conn.user.as_str(), "-h", conn.host.as_str()]);
        run(cmd, &self.pg_dump)
    }

    fn restore(&self, conn: &ConnectionParams, dump: &Path) -> DatabaseResult<()> {
        let mut cmd = self.command(&self.pg_restore, conn);
        cmd.args(["-Fc", "-c", "-d", conn.database.as_str()])
            .arg(dump)
            .args(["-w", "-U", conn.user.as_str(), "-h", conn.host.as_str()]);
        run(cmd, &self.pg_restore)
    }
}
