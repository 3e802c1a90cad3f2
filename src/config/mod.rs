//! Host configuration for mmomni
//!
//! The configuration document lives at `/etc/mattermost/mmomni.yml` and is
//! shared between the management tool and the provisioning playbooks that
//! apply it. Every field is an explicit `Option`: `None` means the field was
//! absent from the document, which is how configurations written by older
//! releases are recognised and backfilled.
//!
//! The document is always read, changed and written as a whole. Writes go to
//! a sibling temporary file that is fsynced and renamed over the target.

mod errors;
pub mod secrets;

pub use errors::{ConfigError, ConfigResult};

use std::fs::{self, DirBuilder, File, OpenOptions, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Installed location of the configuration document
pub const CONFIG_PATH: &str = "/etc/mattermost/mmomni.yml";

/// Name of the configuration document inside a backup archive
pub const CONFIG_FILE_NAME: &str = "mmomni.yml";

/// Directory used by scheduled backups
pub const AUTO_BACKUP_DIR: &str = "/var/opt/mattermost/backups";

/// Name of the platform database
pub const DATABASE_NAME: &str = "mattermost";

pub const DEFAULT_DB_USER: &str = "mmuser";
pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_SSL_MODE: &str = "disable";
pub const DEFAULT_DATA_DIRECTORY: &str = "/var/opt/mattermost/data";
pub const DEFAULT_CLIENT_MAX_BODY_SIZE: &str = "50M";

const CONFIG_FILE_MODE: u32 = 0o640;
const CONFIG_DIR_MODE: u32 = 0o755;

/// The mmomni configuration document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    // --- Database ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_host: Option<String>,
    /// Either "disable" or "require"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_use_ssl: Option<String>,

    // --- Identity / network ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
    /// Let's Encrypt contact address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https: Option<bool>,

    // --- Storage ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_directory: Option<String>,

    // --- Platform toggles ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_plugin_uploads: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_local_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_max_body_size: Option<String>,
    /// Custom nginx template; dropped from the document when empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nginx_template: Option<String>,

    // --- Monitoring (Prometheus + Grafana) ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring_installed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grafana_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grafana_password: Option<String>,

    // --- Video conferencing (Jitsi) ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitsi_installed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitsi_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitsi_fqdn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitsi_jvb_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitsi_focus_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitsi_focus_password: Option<String>,
}

fn text(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn flag(value: &Option<bool>) -> bool {
    value.unwrap_or(false)
}

fn fill(value: &mut Option<String>, default: &str) {
    if value.is_none() {
        *value = Some(default.to_string());
    }
}

fn fill_flag(value: &mut Option<bool>, default: bool) {
    if value.is_none() {
        *value = Some(default);
    }
}

fn require(field: &'static str, value: &Option<String>, context: &str) -> ConfigResult<()> {
    if text(value).is_empty() {
        return Err(ConfigError::invalid(field, format!("cannot be empty {}", context)));
    }
    Ok(())
}

impl Config {
    /// Parse a configuration document without backfilling or validating it
    pub fn read(path: &Path) -> ConfigResult<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(ConfigError::io(path, e)),
        };

        // An empty document is a document with every field absent
        if content.trim().is_empty() {
            return Ok(Config::default());
        }

        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load an installed configuration: parse, backfill defaults, validate
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let mut config = Self::read(path)?;
        config.set_defaults();
        config.validate()?;
        Ok(config)
    }

    /// Fill every absent field with its default.
    ///
    /// Present fields are never touched, so applying this twice is the same
    /// as applying it once.
    pub fn set_defaults(&mut self) {
        fill(&mut self.db_user, DEFAULT_DB_USER);
        fill(&mut self.db_password, "");
        fill(&mut self.db_host, DEFAULT_DB_HOST);
        fill(&mut self.db_use_ssl, DEFAULT_DB_SSL_MODE);
        fill(&mut self.fqdn, "");
        fill(&mut self.email, "");
        fill_flag(&mut self.https, false);
        fill(&mut self.data_directory, DEFAULT_DATA_DIRECTORY);
        fill_flag(&mut self.enable_plugin_uploads, false);
        fill_flag(&mut self.enable_local_mode, true);
        fill(&mut self.client_max_body_size, DEFAULT_CLIENT_MAX_BODY_SIZE);
        fill(&mut self.nginx_template, "");
        fill_flag(&mut self.monitoring_installed, false);
        fill_flag(&mut self.monitoring_enabled, false);
        fill(&mut self.grafana_user, "");
        fill(&mut self.grafana_password, "");
        fill_flag(&mut self.jitsi_installed, false);
        fill_flag(&mut self.jitsi_enabled, false);
        fill(&mut self.jitsi_fqdn, "");
        fill(&mut self.jitsi_jvb_secret, "");
        fill(&mut self.jitsi_focus_secret, "");
        fill(&mut self.jitsi_focus_password, "");
    }

    /// Consuming variant of [`Config::set_defaults`]
    pub fn with_defaults(mut self) -> Self {
        self.set_defaults();
        self
    }

    /// Check every configuration invariant.
    ///
    /// Absent strings count as empty and absent flags as false.
    pub fn validate(&self) -> ConfigResult<()> {
        require("db_user", &self.db_user, "")?;

        match text(&self.db_use_ssl) {
            "disable" | "require" => {}
            other => {
                return Err(ConfigError::invalid(
                    "db_use_ssl",
                    format!("must be either 'disable' or 'require', got '{}'", other),
                ))
            }
        }

        if flag(&self.https) {
            require("fqdn", &self.fqdn, "when https is enabled")?;
            require("email", &self.email, "when https is enabled")?;
        }

        require("data_directory", &self.data_directory, "")?;

        if flag(&self.monitoring_enabled) {
            if !flag(&self.monitoring_installed) {
                return Err(ConfigError::invalid(
                    "monitoring_enabled",
                    "monitoring cannot be enabled unless monitoring_installed is set",
                ));
            }
            require("grafana_user", &self.grafana_user, "when monitoring is enabled")?;
            require(
                "grafana_password",
                &self.grafana_password,
                "when monitoring is enabled",
            )?;
        }

        if flag(&self.jitsi_enabled) {
            if !flag(&self.jitsi_installed) {
                return Err(ConfigError::invalid(
                    "jitsi_enabled",
                    "jitsi cannot be enabled unless jitsi_installed is set",
                ));
            }
            require("jitsi_fqdn", &self.jitsi_fqdn, "when jitsi is enabled")?;
            require("jitsi_jvb_secret", &self.jitsi_jvb_secret, "when jitsi is enabled")?;
            require(
                "jitsi_focus_secret",
                &self.jitsi_focus_secret,
                "when jitsi is enabled",
            )?;
            require(
                "jitsi_focus_password",
                &self.jitsi_focus_password,
                "when jitsi is enabled",
            )?;

            if text(&self.jitsi_fqdn) == text(&self.fqdn) {
                return Err(ConfigError::invalid(
                    "jitsi_fqdn",
                    "must differ from fqdn",
                ));
            }
        }

        Ok(())
    }

    /// Copy of the configuration as it should appear on disk.
    ///
    /// Fields that are omitted from the document when empty are reset to absent.
    pub fn pre_save(&self) -> Self {
        let mut config = self.clone();
        if config.nginx_template.as_deref() == Some("") {
            config.nginx_template = None;
        }
        config
    }

    /// Serialize the on-disk form of the configuration
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(&self.pre_save())?)
    }

    /// Persist the configuration without validating it.
    ///
    /// Used by `init`, which writes a first document the operator completes later.
    pub fn write_to_disk(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_yaml()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            DirBuilder::new()
                .recursive(true)
                .mode(CONFIG_DIR_MODE)
                .create(parent)
                .map_err(|e| ConfigError::io(parent, e))?;
        }

        let tmp_path = temp_path_for(path);
        let result = write_synced(&tmp_path, content.as_bytes())
            .and_then(|_| fs::rename(&tmp_path, path).map_err(|e| ConfigError::io(path, e)));

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }

    /// Validate and persist the configuration
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        self.validate()?;
        self.write_to_disk(path)
    }

    pub fn db_user(&self) -> &str {
        text(&self.db_user)
    }

    pub fn db_password(&self) -> &str {
        text(&self.db_password)
    }

    pub fn db_host(&self) -> &str {
        text(&self.db_host)
    }

    pub fn db_use_ssl(&self) -> &str {
        text(&self.db_use_ssl)
    }

    pub fn fqdn(&self) -> &str {
        text(&self.fqdn)
    }

    pub fn data_directory(&self) -> &Path {
        Path::new(text(&self.data_directory))
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| CONFIG_FILE_NAME.into());
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_synced(path: &Path, bytes: &[u8]) -> ConfigResult<()> {
    let mut file: File = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(CONFIG_FILE_MODE)
        .open(path)
        .map_err(|e| ConfigError::io(path, e))?;

    // mode() only applies on creation; a stale temp file keeps its own bits
    file.set_permissions(Permissions::from_mode(CONFIG_FILE_MODE))
        .map_err(|e| ConfigError::io(path, e))?;
    file.write_all(bytes).map_err(|e| ConfigError::io(path, e))?;
    file.sync_all().map_err(|e| ConfigError::io(path, e))
}
