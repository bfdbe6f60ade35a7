// Persistent client settings: service address, saved username and default
// upload group. Stored as TOML under the user's config directory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::ConfigError;

/// Managed Protecode SC service, used when no appliance address is set.
pub const DEFAULT_HOST: &str = "https://protecode-sc.com";

/// Overrides the directory holding `config.toml` and `credentials.toml`.
pub const CONFIG_DIR_ENV: &str = "PROTECODESC_CONFIG_DIR";

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_group: Option<u64>,
}

/// File-backed settings. Every setter writes the whole file atomically.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    settings: Settings,
}

impl ConfigStore {
    /// `$PROTECODESC_CONFIG_DIR`, or `<config dir>/protecodesc`.
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }
        dirs::config_dir()
            .map(|d| d.join("protecodesc"))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn open_in(dir: &Path) -> Result<Self, ConfigError> {
        Self::open(dir.join(CONFIG_FILE))
    }

    /// Load settings from `path`. A missing file yields defaults.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let settings = match fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.clone(),
                source: e,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(e) => return Err(ConfigError::Read { path, source: e }),
        };
        Ok(Self { path, settings })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Configured service address, falling back to the managed service.
    pub fn get_host(&self) -> &str {
        self.settings
            .host
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or(DEFAULT_HOST)
    }

    pub fn set_host(&mut self, host: &str) -> Result<(), ConfigError> {
        self.settings.host = Some(host.trim().to_string());
        self.save()
    }

    pub fn get_default_group(&self) -> Option<u64> {
        self.settings.default_group
    }

    pub fn set_default_group(&mut self, group: Option<u64>) -> Result<(), ConfigError> {
        self.settings.default_group = group;
        self.save()
    }

    pub fn username(&self) -> Option<&str> {
        self.settings.username.as_deref().filter(|u| !u.is_empty())
    }

    pub fn set_username(&mut self, username: Option<&str>) -> Result<(), ConfigError> {
        self.settings.username = username.map(str::to_string);
        self.save()
    }

    fn save(&self) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(&self.settings)?;
        write_atomic(&self.path, content.as_bytes())
    }
}

/// Write `contents` to a temporary file beside `path` and rename it into
/// place, so an interrupted write never leaves a truncated file. The
/// temporary file is created owner-only and keeps that mode after the rename.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ConfigError> {
    let write_err = |source: std::io::Error| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(write_err)?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(contents).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    debug!(path = %path.display(), "Saved settings");
    Ok(())
}
