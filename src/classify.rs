// Maps a completed HTTP exchange to a domain outcome. Classification only
// ever happens after a response was received; transport failures are handled
// by the retry executor and never reach this module.

use serde::de::DeserializeOwned;

use crate::error::ClientError;

/// Status code and body of one completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Classified result of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome<T> {
    Success(T),
    NotFound,
    AuthFailure,
    UnclassifiedFailure(u16),
}

/// Classify a response by status code. The body is kept only on success.
pub fn classify(response: RawResponse) -> RequestOutcome<Vec<u8>> {
    match response.status {
        200 => RequestOutcome::Success(response.body),
        401 | 403 => RequestOutcome::AuthFailure,
        404 => RequestOutcome::NotFound,
        code => RequestOutcome::UnclassifiedFailure(code),
    }
}

impl RequestOutcome<Vec<u8>> {
    /// Decode the success payload as JSON. Other outcomes pass through.
    pub fn decode<T: DeserializeOwned>(self) -> Result<RequestOutcome<T>, ClientError> {
        Ok(match self {
            RequestOutcome::Success(body) => {
                RequestOutcome::Success(serde_json::from_slice(&body).map_err(ClientError::Decode)?)
            }
            RequestOutcome::NotFound => RequestOutcome::NotFound,
            RequestOutcome::AuthFailure => RequestOutcome::AuthFailure,
            RequestOutcome::UnclassifiedFailure(code) => RequestOutcome::UnclassifiedFailure(code),
        })
    }
}

impl<T> RequestOutcome<T> {
    /// Convert into the error taxonomy used by the public client operations.
    pub fn into_result(self) -> Result<T, ClientError> {
        match self {
            RequestOutcome::Success(value) => Ok(value),
            RequestOutcome::NotFound => Err(ClientError::ResultNotFound),
            RequestOutcome::AuthFailure => Err(ClientError::InvalidLogin),
            RequestOutcome::UnclassifiedFailure(status) => {
                Err(ClientError::UnexpectedStatus { status })
            }
        }
    }
}
