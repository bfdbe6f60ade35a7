// Bounded retry with exponential backoff around single HTTP attempts.
//
// Only transport-level failures are retried. A response with any status code
// counts as a completed exchange and goes straight back to the caller for
// classification, so an upload that reached the server is never sent twice
// because of an application-level error.

use std::time::Duration;

use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::{ClientError, SendError};

/// Attempts per request, including the first one.
pub const MAX_HTTP_ATTEMPTS: u32 = 3;

/// Backoff settings. Delay after failed attempt `n` is `min(cap, unit * 2^n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub unit: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_HTTP_ATTEMPTS,
            unit: Duration::from_secs(1),
            cap: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay between attempt `attempt` (1-based) and the next one.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.unit.saturating_mul(factor).min(self.cap)
    }
}

/// Where the executor is in its attempt sequence.
#[derive(Debug)]
enum AttemptState<T> {
    Attempting(u32),
    Succeeded(T),
    Exhausted { attempts: u32, last_error: String },
}

/// Runs an action under a `RetryPolicy`, honouring a cancellation token.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    cancel: CancelToken,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, cancel: CancelToken) -> Self {
        Self { policy, cancel }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run `action` until it succeeds, fails fatally, or attempts run out.
    /// `action` receives the 1-based attempt number.
    pub fn execute<T, F>(&self, action: F) -> Result<T, ClientError>
    where
        F: FnMut(u32) -> Result<T, SendError>,
    {
        let cancel = self.cancel.clone();
        self.execute_with(action, |delay| cancel.sleep(delay))
    }

    fn execute_with<T, F, P>(&self, mut action: F, mut pause: P) -> Result<T, ClientError>
    where
        F: FnMut(u32) -> Result<T, SendError>,
        P: FnMut(Duration) -> Result<(), ClientError>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut state = AttemptState::Attempting(1);
        loop {
            state = match state {
                AttemptState::Attempting(attempt) => {
                    self.cancel.check()?;
                    match action(attempt) {
                        Ok(value) => AttemptState::Succeeded(value),
                        Err(SendError::Fatal(err)) => return Err(err),
                        Err(SendError::Transient(cause)) => {
                            warn!(attempt, max_attempts, "Connection failed: {}", cause);
                            if attempt >= max_attempts {
                                AttemptState::Exhausted {
                                    attempts: attempt,
                                    last_error: cause,
                                }
                            } else {
                                let delay = self.policy.backoff(attempt);
                                debug!(?delay, "Retrying request");
                                pause(delay)?;
                                AttemptState::Attempting(attempt + 1)
                            }
                        }
                    }
                }
                AttemptState::Succeeded(value) => return Ok(value),
                AttemptState::Exhausted {
                    attempts,
                    last_error,
                } => {
                    return Err(ClientError::RetriesExhausted {
                        attempts,
                        last_error,
                    })
                }
            };
        }
    }
}
