// Login credentials and where they are kept between runs.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::write_atomic;
use crate::error::ConfigError;

const CREDENTIALS_FILE: &str = "credentials.toml";

/// Username/password pair sent as HTTP basic auth on every request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Storage for passwords keyed by username.
pub trait CredentialStore {
    fn get(&self, username: &str) -> Result<Option<String>, ConfigError>;
    fn set(&mut self, username: &str, password: &str) -> Result<(), ConfigError>;
    fn forget(&mut self, username: &str) -> Result<(), ConfigError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    passwords: BTreeMap<String, String>,
}

/// Owner-only TOML file beside the settings file.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    entries: CredentialFile,
}

impl FileCredentialStore {
    pub fn open_in(dir: &Path) -> Result<Self, ConfigError> {
        Self::open(dir.join(CREDENTIALS_FILE))
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.clone(),
                source: e,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CredentialFile::default(),
            Err(e) => return Err(ConfigError::Read { path, source: e }),
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(&self.entries)?;
        write_atomic(&self.path, content.as_bytes())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, username: &str) -> Result<Option<String>, ConfigError> {
        Ok(self
            .entries
            .passwords
            .get(username)
            .filter(|p| !p.is_empty())
            .cloned())
    }

    fn set(&mut self, username: &str, password: &str) -> Result<(), ConfigError> {
        self.entries
            .passwords
            .insert(username.to_string(), password.to_string());
        self.save()
    }

    fn forget(&mut self, username: &str) -> Result<(), ConfigError> {
        if self.entries.passwords.remove(username).is_some() {
            self.save()?;
        }
        Ok(())
    }
}
