// The seam between the scan client and the HTTP engine. `HttpTransport` is
// the production implementation over a blocking reqwest client; tests plug in
// scripted transports instead.

use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::blocking::{Body, Client};

use crate::classify::RawResponse;
use crate::credentials::Credentials;
use crate::error::{ClientError, SendError};

/// Connect timeout, and the overall deadline of every request except uploads.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

/// Everything needed to perform one exchange, independent of the engine.
/// The body, when present, is a file streamed from disk on every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<PathBuf>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.body = Some(path.into());
        self
    }
}

/// Performs a single authenticated HTTP attempt. Implementations must report
/// connection-level problems as `SendError::Transient` and return every
/// received response, whatever its status, as `Ok`.
pub trait Transport {
    fn send(&self, request: &ApiRequest, credentials: &Credentials) -> Result<RawResponse, SendError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &ApiRequest, credentials: &Credentials) -> Result<RawResponse, SendError> {
        (**self).send(request, credentials)
    }
}

/// Engine settings for `HttpTransport`.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub timeout: Duration,
    /// Skip TLS certificate verification.
    pub insecure: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: HTTP_TIMEOUT,
            insecure: false,
        }
    }
}

/// Blocking reqwest transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(options: &TransportOptions) -> Result<Self, ClientError> {
        let client = Client::builder()
            .connect_timeout(options.timeout)
            .timeout(None::<Duration>)
            .danger_accept_invalid_certs(options.insecure)
            .user_agent(format!("protecodesc-cli/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ClientError::HttpClient)?;
        Ok(Self {
            client,
            timeout: options.timeout,
        })
    }
}

/// Overall deadline for one exchange. Uploads stream the whole file inside
/// the request, so they only get the connect timeout.
fn request_deadline(method: Method, timeout: Duration) -> Option<Duration> {
    match method {
        Method::Put => None,
        Method::Get | Method::Post | Method::Delete => Some(timeout),
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &ApiRequest, credentials: &Credentials) -> Result<RawResponse, SendError> {
        let url = request.url.as_str();
        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Put => self.client.put(url),
            Method::Post => self.client.post(url),
            Method::Delete => self.client.delete(url),
        };
        builder = builder.basic_auth(credentials.username(), Some(credentials.password()));
        if let Some(deadline) = request_deadline(request.method, self.timeout) {
            builder = builder.timeout(deadline);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(path) = &request.body {
            // Reopened per attempt so a retry starts from the first byte.
            let file = File::open(path).map_err(|e| SendError::Fatal(ClientError::io(path, e)))?;
            builder = builder.body(Body::from(file));
        }

        let response = builder.send().map_err(|e| {
            if e.is_builder() {
                SendError::Fatal(ClientError::InvalidRequest(e))
            } else {
                SendError::Transient(e.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| {
            let cause = format!("failed to read response body: {}", e);
            // An answered PUT is never resent from here; `upload` decides.
            if request.method == Method::Put {
                SendError::Fatal(ClientError::IncompleteResponse { status, cause })
            } else {
                SendError::Transient(cause)
            }
        })?;
        Ok(RawResponse::new(status, body.to_vec()))
    }
}
