//! Reconcile a restored configuration with the host it lands on
//!
//! The archive's configuration wins for everything except the database
//! credentials, which stay those of the host being restored onto. Fields the
//! archive predates are backfilled with defaults.

use std::path::Path;

use crate::config::Config;

use super::errors::{RestoreError, RestoreResult};

/// Merge the extracted configuration onto the installed one.
///
/// Pure: takes the host's credentials, backfills defaults, no validation.
pub fn merge_restored_config(installed: &Config, mut restored: Config) -> Config {
    restored.db_user = installed.db_user.clone();
    restored.db_password = installed.db_password.clone();
    restored.set_defaults();
    restored
}

/// Merge the configuration extracted to `extracted_path` into the host's
/// configuration at `host_path` and persist it.
///
/// The host file is written only if the merged result validates.
pub fn restore_config(host_path: &Path, extracted_path: &Path) -> RestoreResult<Config> {
    let installed = Config::load(host_path).map_err(|e| {
        RestoreError::config_error(
            format!(
                "Failed to read installed configuration: {}",
                host_path.display()
            ),
            e,
        )
    })?;

    let restored = Config::read(extracted_path).map_err(|e| {
        RestoreError::config_error(
            format!(
                "Failed to read restored configuration: {}",
                extracted_path.display()
            ),
            e,
        )
    })?;

    let merged = merge_restored_config(&installed, restored);
    merged
        .validate()
        .map_err(|e| RestoreError::config_error("Restored configuration is invalid", e))?;

    merged.save(host_path).map_err(|e| {
        RestoreError::config_error(
            format!("Failed to save configuration: {}", host_path.display()),
            e,
        )
    })?;

    Ok(merged)
}
