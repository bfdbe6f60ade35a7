// API client module: the Protecode SC REST client. Every operation resolves
// its endpoint, runs the request through the retry executor, classifies the
// response and decodes the body. Uploads are skipped when the service
// already knows the file's SHA1.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::classify::{classify, RequestOutcome};
use crate::credentials::Credentials;
use crate::endpoint::Endpoint;
use crate::error::ClientError;
use crate::hashing::file_sha1;
use crate::models::{AppList, AppSummary, Group, GroupList, ScanResponse, ScanResult};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::transport::{ApiRequest, HttpTransport, Method, Transport, TransportOptions};

/// Header carrying the target group on uploads.
pub const GROUP_HEADER: &str = "Group";

/// Authenticated client for one service. Holds the credential pair for its
/// whole lifetime; build a new one to log in as someone else.
pub struct ScanClient<T = HttpTransport> {
    transport: T,
    host: String,
    credentials: Credentials,
    executor: RetryExecutor,
}

impl ScanClient<HttpTransport> {
    /// Client over the blocking reqwest transport with the default retry policy.
    pub fn connect(
        host: &str,
        credentials: Credentials,
        options: &TransportOptions,
        cancel: CancelToken,
    ) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(options)?;
        Ok(Self::with_transport(
            transport,
            host,
            credentials,
            RetryExecutor::new(RetryPolicy::default(), cancel),
        ))
    }
}

impl<T: Transport> ScanClient<T> {
    pub fn with_transport(
        transport: T,
        host: &str,
        credentials: Credentials,
        executor: RetryExecutor,
    ) -> Self {
        Self {
            transport,
            host: host.trim_end_matches('/').to_string(),
            credentials,
            executor,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn cancel_token(&self) -> &CancelToken {
        self.executor.cancel_token()
    }

    /// Upload a file for analysis unless its SHA1 is already known.
    ///
    /// The display name defaults to the file's base name and is sanitized
    /// before it goes into the URL. An existing result for the same content
    /// is returned as is; the file is only sent after the lookup reports
    /// `ResultNotFound`.
    pub fn upload(
        &self,
        path: &Path,
        display_name: Option<&str>,
        group: Option<u64>,
    ) -> Result<ScanResult, ClientError> {
        self.upload_response(path, display_name, group)
            .map(|r| r.results)
    }

    /// Like `upload`, keeping the full response document.
    pub fn upload_response(
        &self,
        path: &Path,
        display_name: Option<&str>,
        group: Option<u64>,
    ) -> Result<ScanResponse, ClientError> {
        let name = match display_name {
            Some(name) => sanitize_display_name(name),
            None => sanitize_display_name(&default_display_name(path)),
        };

        let sha1 = file_sha1(path)?;
        match self.fetch_response(&sha1) {
            Ok(existing) => {
                info!(%sha1, file = %path.display(), "Already scanned, not uploading again");
                return Ok(existing);
            }
            Err(ClientError::ResultNotFound) => {}
            Err(e) => return Err(e),
        }

        let endpoint = Endpoint::Upload { filename: &name };
        let mut request = ApiRequest::new(Method::Put, endpoint.resolve(&self.host)).body_file(path);
        if let Some(group) = group {
            request = request.header(GROUP_HEADER, group.to_string());
        }
        info!(%sha1, name = %name, ?group, "Uploading file");

        // A PUT whose reply broke off is only sent again once the digest
        // lookup confirms the service did not keep the file.
        let max_rounds = self.executor.policy().max_attempts.max(1);
        let mut round = 1;
        loop {
            match self.call(endpoint, &request) {
                Err(ClientError::IncompleteResponse { status, cause }) => {
                    warn!(%sha1, status, round, "Upload reply was cut short: {}", cause);
                    match self.fetch_response(&sha1) {
                        Ok(stored) => return Ok(stored),
                        Err(ClientError::ResultNotFound) if round < max_rounds => round += 1,
                        Err(ClientError::ResultNotFound) => {
                            return Err(ClientError::RetriesExhausted {
                                attempts: round,
                                last_error: cause,
                            })
                        }
                        Err(e) => return Err(e),
                    }
                }
                other => return other,
            }
        }
    }

    /// Result by analysis id or SHA1.
    pub fn fetch_result(&self, id_or_sha1: &str) -> Result<ScanResult, ClientError> {
        self.fetch_response(id_or_sha1).map(|r| r.results)
    }

    /// Full result document by analysis id or SHA1.
    pub fn fetch_response(&self, id_or_sha1: &str) -> Result<ScanResponse, ClientError> {
        let endpoint = Endpoint::Result { id_or_sha1 };
        let request = ApiRequest::new(Method::Get, endpoint.resolve(&self.host));
        self.call(endpoint, &request)
    }

    /// Ask the service to analyse a previously uploaded file again.
    pub fn rescan(&self, id_or_sha1: &str) -> Result<ScanResult, ClientError> {
        let endpoint = Endpoint::Rescan { id_or_sha1 };
        let request = ApiRequest::new(Method::Post, endpoint.resolve(&self.host));
        self.call::<ScanResponse>(endpoint, &request)
            .map(|r| r.results)
    }

    /// Delete a result together with the uploaded file. Returns the
    /// acknowledgement document (`Null` when the body is empty).
    pub fn delete(&self, id_or_sha1: &str) -> Result<Value, ClientError> {
        let endpoint = Endpoint::Result { id_or_sha1 };
        let request = ApiRequest::new(Method::Delete, endpoint.resolve(&self.host));
        match self.exchange(endpoint, &request)? {
            RequestOutcome::Success(body) if body.iter().all(u8::is_ascii_whitespace) => {
                Ok(Value::Null)
            }
            outcome => outcome.decode::<Value>()?.into_result(),
        }
    }

    pub fn list_groups(&self) -> Result<Vec<Group>, ClientError> {
        let endpoint = Endpoint::Groups;
        let request = ApiRequest::new(Method::Get, endpoint.resolve(&self.host));
        self.call::<GroupList>(endpoint, &request)
            .map(|l| l.groups)
    }

    /// Applications, optionally only those in `group`.
    pub fn list_apps(&self, group: Option<&str>) -> Result<Vec<AppSummary>, ClientError> {
        let endpoint = match group {
            Some(group) => Endpoint::AppsByGroup { group },
            None => Endpoint::Apps,
        };
        let request = ApiRequest::new(Method::Get, endpoint.resolve(&self.host));
        self.call::<AppList>(endpoint, &request)
            .map(|l| l.products)
    }

    fn call<D: DeserializeOwned>(
        &self,
        endpoint: Endpoint<'_>,
        request: &ApiRequest,
    ) -> Result<D, ClientError> {
        self.exchange(endpoint, request)?.decode::<D>()?.into_result()
    }

    /// Send with retries and classify the response.
    fn exchange(
        &self,
        endpoint: Endpoint<'_>,
        request: &ApiRequest,
    ) -> Result<RequestOutcome<Vec<u8>>, ClientError> {
        let response = self.executor.execute(|attempt| {
            debug!(
                operation = endpoint.name(),
                method = ?request.method,
                url = %request.url,
                attempt,
                "Sending request"
            );
            self.transport.send(request, &self.credentials)
        })?;
        debug!(operation = endpoint.name(), status = response.status, "Received response");
        Ok(classify(response))
    }
}

/// Base name of `path`, used when no display name is given.
fn default_display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string())
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`, one for one.
pub fn sanitize_display_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
