//! mmomni - backup and restore for Mattermost Omnibus
//!
//! Snapshots a deployment's configuration, database and data directory into
//! a single gzip-compressed tar archive, and restores such an archive onto a
//! host while keeping that host's database credentials.

pub mod backup;
pub mod cli;
pub mod config;
pub mod database;
pub mod observability;
pub mod restore;
pub mod staging;
