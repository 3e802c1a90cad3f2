//! CLI module for mmomni
//!
//! Provides command-line interface for:
//! - backup: Archive configuration, database and data directory
//! - restore: Restore an archive onto this host
//! - init: Write the initial configuration file

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{backup, init, restore, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
