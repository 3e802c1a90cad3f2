//! CLI argument definitions using clap
//!
//! Commands:
//! - mmomni backup [-o OUTPUT] [-d] [-c CONFIG] [-a]
//! - mmomni restore <FILE> [-c CONFIG]
//! - mmomni init --fqdn <FQDN> --email <EMAIL> [--https <BOOL>] [-c CONFIG]

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CONFIG_PATH;

/// mmomni - Mattermost Omnibus backup and restore
#[derive(Parser, Debug)]
#[command(name = "mmomni")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a backup of the configuration, the database and the data directory
    Backup {
        /// The path of the backup file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Backup database only, excluding the data directory
        #[arg(short = 'd', long = "dbonly")]
        db_only: bool,

        /// The path of the configuration file
        #[arg(short, long, default_value = CONFIG_PATH)]
        config: PathBuf,

        /// Run the automatic backup process (database only, timestamped)
        #[arg(short, long)]
        auto: bool,
    },

    /// Restore a backup created with `mmomni backup`
    Restore {
        /// The backup file to restore
        file: PathBuf,

        /// The path of the configuration file
        #[arg(short, long, default_value = CONFIG_PATH)]
        config: PathBuf,
    },

    /// Write the initial configuration file
    #[command(hide = true)]
    Init {
        /// Mattermost domain name
        #[arg(long)]
        fqdn: String,

        /// Letsencrypt contact email address
        #[arg(long)]
        email: String,

        /// Enable to configure the SSL certificate
        #[arg(long, action = ArgAction::Set, default_value_t = true)]
        https: bool,

        /// The path of the configuration file
        #[arg(short, long, default_value = CONFIG_PATH)]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
