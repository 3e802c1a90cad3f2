//! Private staging workspace for one backup or restore run
//!
//! The workspace is a fresh `mmomni_*` directory, readable only by its owner.
//! It is removed when the workspace is dropped, on success and on every error
//! path alike.

use std::fs::Permissions;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tempfile::TempDir;

use crate::observability::Logger;

const STAGING_PREFIX: &str = "mmomni_";
const STAGING_MODE: u32 = 0o700;

#[derive(Debug)]
pub struct StagingWorkspace {
    dir: TempDir,
}

impl StagingWorkspace {
    /// Create a workspace under `parent`, or under the system temp directory
    pub fn create(parent: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder
            .prefix(STAGING_PREFIX)
            .permissions(Permissions::from_mode(STAGING_MODE));

        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the workspace now, logging instead of failing if removal breaks
    pub fn close(self) {
        let path = self.dir.path().display().to_string();
        if let Err(e) = self.dir.close() {
            let reason = e.to_string();
            Logger::warn(
                "STAGING_CLEANUP_FAILED",
                &[("path", path.as_str()), ("reason", reason.as_str())],
            );
        }
    }
}
