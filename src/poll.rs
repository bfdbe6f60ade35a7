// Synchronous wait for an analysis to finish.

use std::time::Duration;

use tracing::debug;

use crate::api::ScanClient;
use crate::error::ClientError;
use crate::models::{ScanResponse, ScanResult};
use crate::transport::Transport;

/// Delay between two result lookups.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Polls a result until its status is terminal.
#[derive(Debug, Clone, Copy)]
pub struct PollLoop {
    interval: Duration,
}

impl Default for PollLoop {
    fn default() -> Self {
        Self::new(POLL_INTERVAL)
    }
}

impl PollLoop {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Fetch `id_or_sha1` until it is no longer busy and return that
    /// snapshot. `on_busy` sees every busy snapshot before the loop sleeps.
    ///
    /// `ResultNotFound` ends the loop at once: a missing result is not a
    /// result that is still being processed. There is no overall deadline;
    /// the client's cancel token interrupts the wait.
    pub fn wait<T, F>(
        &self,
        client: &ScanClient<T>,
        id_or_sha1: &str,
        mut on_busy: F,
    ) -> Result<ScanResponse, ClientError>
    where
        T: Transport,
        F: FnMut(&ScanResult),
    {
        let cancel = client.cancel_token().clone();
        let mut polls = 0u32;
        loop {
            cancel.check()?;
            let response = client.fetch_response(id_or_sha1)?;
            polls += 1;
            if response.results.status.is_terminal() {
                debug!(id_or_sha1, polls, "Result is final");
                return Ok(response);
            }
            on_busy(&response.results);
            debug!(id_or_sha1, polls, interval = ?self.interval, "Result busy, waiting");
            cancel.sleep(self.interval)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{client, result_doc, ScriptedTransport};
    use crate::models::ScanStatus;
    use serde_json::json;
    use std::time::Instant;

    fn quick() -> PollLoop {
        PollLoop::new(Duration::ZERO)
    }

    #[test]
    fn returns_first_terminal_status() {
        let transport = ScriptedTransport::default()
            .reply(200, result_doc("B", "abc"))
            .reply(200, result_doc("B", "abc"))
            .reply(200, result_doc("R", "abc"))
            .reply(200, result_doc("R", "abc"));
        let mut busy_seen = 0;
        let res = quick()
            .wait(&client(&transport), "abc", |_| busy_seen += 1)
            .unwrap();
        assert_eq!(res.results.status, ScanStatus::Ready);
        assert_eq!(busy_seen, 2);
        // the fourth scripted reply is never requested
        assert_eq!(transport.sent.borrow().len(), 3);
    }

    #[test]
    fn ready_on_first_poll_does_not_sleep() {
        let transport = ScriptedTransport::default().reply(200, result_doc("R", "abc"));
        let start = Instant::now();
        let res = PollLoop::new(Duration::from_secs(60))
            .wait(&client(&transport), "abc", |_| panic!("not busy"))
            .unwrap();
        assert!(res.results.is_ready());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn unclassified_status_is_terminal() {
        let transport = ScriptedTransport::default().reply(200, result_doc("F", "abc"));
        let res = quick()
            .wait(&client(&transport), "abc", |_| {})
            .unwrap();
        assert_eq!(res.results.status, ScanStatus::Other("F".into()));
    }

    #[test]
    fn not_found_stops_immediately() {
        let transport = ScriptedTransport::default()
            .reply(200, result_doc("B", "abc"))
            .reply(404, json!({}))
            .reply(200, result_doc("R", "abc"));
        let err = quick()
            .wait(&client(&transport), "abc", |_| {})
            .unwrap_err();
        assert!(matches!(err, ClientError::ResultNotFound));
        assert_eq!(transport.sent.borrow().len(), 2);
    }

    #[test]
    fn cancellation_interrupts_wait() {
        let transport = ScriptedTransport::default()
            .reply(200, result_doc("B", "abc"))
            .reply(200, result_doc("R", "abc"));
        let c = client(&transport);
        let cancel = c.cancel_token().clone();
        let err = PollLoop::new(Duration::from_secs(60))
            .wait(&c, "abc", |_| cancel.cancel())
            .unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
        assert_eq!(transport.sent.borrow().len(), 1);
    }
}
