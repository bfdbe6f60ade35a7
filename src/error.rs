// Error types shared by the library modules.
//
// The HTTP layer keeps two levels: `SendError` is what a single transport
// attempt reports (and is only ever seen by the retry executor), while
// `ClientError` is what every public operation returns.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the scan client and its persistence helpers.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The service rejected the credentials (HTTP 401 or 403).
    #[error("Login was rejected by the service")]
    InvalidLogin,

    /// No result exists for the requested id or SHA1 (HTTP 404).
    #[error("Result was not found")]
    ResultNotFound,

    /// Any status code the client does not know how to interpret.
    #[error("Unhandled status code {status}")]
    UnexpectedStatus { status: u16 },

    /// An upload got a status line but its response body broke off. The
    /// server may already have stored the file.
    #[error("Response with status {status} was cut short: {cause}")]
    IncompleteResponse { status: u16, cause: String },

    #[error("Out of HTTP request retry attempts ({attempts} attempts, last error: {last_error})")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// A 200 response whose body was not the expected document.
    #[error("Failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(#[source] reqwest::Error),

    #[error("Interrupted")]
    Cancelled,
}

impl ClientError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ClientError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Outcome of one failed transport attempt.
#[derive(Debug, Error)]
pub enum SendError {
    /// Connection errors, timeouts and malformed responses. Retried.
    #[error("{0}")]
    Transient(String),

    /// Anything that another attempt would not fix.
    #[error(transparent)]
    Fatal(ClientError),
}

/// Errors reading or writing the local configuration and credential files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine a configuration directory")]
    NoConfigDir,
}
