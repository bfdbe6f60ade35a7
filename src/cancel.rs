// Cooperative cancellation for the blocking waits in the client: retry
// backoff and the result poll interval. A Ctrl-C handler flips the flag and
// every sleep notices within one slice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::ClientError;

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Shared interrupt flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that is cancelled when the process receives Ctrl-C. A second
    /// Ctrl-C exits immediately, for waits that never check the token such
    /// as interactive prompts.
    pub fn install_ctrlc_handler() -> Result<Self, ctrlc::Error> {
        let token = Self::new();
        let flag = token.cancelled.clone();
        ctrlc::set_handler(move || {
            if flag.swap(true, Ordering::SeqCst) {
                std::process::exit(130);
            }
        })?;
        Ok(token)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with `Cancelled` if the flag is set.
    pub fn check(&self) -> Result<(), ClientError> {
        if self.is_cancelled() {
            Err(ClientError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, returning early with `Cancelled` on interrupt.
    pub fn sleep(&self, duration: Duration) -> Result<(), ClientError> {
        let deadline = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sleep_returns_immediately() {
        let token = CancelToken::new();
        assert!(token.sleep(Duration::ZERO).is_ok());
    }

    #[test]
    fn cancelled_token_interrupts_sleep() {
        let token = CancelToken::new();
        token.clone().cancel();
        let start = Instant::now();
        let res = token.sleep(Duration::from_secs(30));
        assert!(matches!(res, Err(ClientError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn cancel_from_other_thread_is_observed() {
        let token = CancelToken::new();
        let remote = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            remote.cancel();
        });
        let res = token.sleep(Duration::from_secs(30));
        handle.join().unwrap();
        assert!(matches!(res, Err(ClientError::Cancelled)));
    }
}
