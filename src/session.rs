// Session construction: resolves the stored host and credentials once and
// hands out an explicit `ScanClient`. Commands receive the client as an
// argument; there is no process-wide client.

use std::path::Path;

use tracing::debug;

use crate::api::ScanClient;
use crate::cancel::CancelToken;
use crate::config::ConfigStore;
use crate::credentials::{CredentialStore, Credentials, FileCredentialStore};
use crate::error::{ClientError, ConfigError};
use crate::transport::TransportOptions;

/// Local settings plus the credential store they refer to.
pub struct Session<S = FileCredentialStore> {
    config: ConfigStore,
    store: S,
}

impl Session<FileCredentialStore> {
    /// Open the settings and credential files kept in `dir`.
    pub fn open_in(dir: &Path) -> Result<Self, ConfigError> {
        Ok(Self::new(
            ConfigStore::open_in(dir)?,
            FileCredentialStore::open_in(dir)?,
        ))
    }
}

impl<S: CredentialStore> Session<S> {
    pub fn new(config: ConfigStore, store: S) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigStore {
        &mut self.config
    }

    /// Saved username with its password, if both are present.
    pub fn stored_credentials(&self) -> Result<Option<Credentials>, ConfigError> {
        let Some(username) = self.config.username() else {
            return Ok(None);
        };
        Ok(self
            .store
            .get(username)?
            .map(|password| Credentials::new(username, password)))
    }

    pub fn save_credentials(&mut self, credentials: &Credentials) -> Result<(), ConfigError> {
        self.store
            .set(credentials.username(), credentials.password())?;
        self.config.set_username(Some(credentials.username()))
    }

    pub fn forget_credentials(&mut self) -> Result<(), ConfigError> {
        if let Some(username) = self.config.username().map(str::to_string) {
            self.store.forget(&username)?;
        }
        self.config.set_username(None)
    }

    /// Client for the configured host, authenticated as `credentials`.
    pub fn connect(
        &self,
        credentials: Credentials,
        options: &TransportOptions,
        cancel: CancelToken,
    ) -> Result<ScanClient, ClientError> {
        let host = self.config.get_host();
        debug!(host, username = credentials.username(), "Opening session");
        ScanClient::connect(host, credentials, options, cancel)
    }
}
