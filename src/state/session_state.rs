use std::time::{Duration, Instant};

/// Tracks the state of one worker's portal session
///
/// Every worker owns exactly one of these alongside its HTTP client. It carries
/// the session token, the per-session request pacing, and counters used in logs.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Identity of the session, unique per worker and per rebuild
    pub session_id: String,

    /// Number of requests made through this session
    pub request_count: u32,

    /// Timestamp of the last request made through this session
    pub last_request_time: Option<Instant>,

    /// Session token read from the portal landing page
    pub token: Option<String>,

    /// How many times the token has been re-acquired
    pub token_refreshes: u32,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            request_count: 0,
            last_request_time: None,
            token: None,
            token_refreshes: 0,
        }
    }

    /// Checks if a request can be made now without breaking the minimum interval
    pub fn can_request(&self, min_interval: Duration, now: Instant) -> bool {
        self.time_until_next_request(min_interval, now).is_none()
    }

    /// Records that a request was made through this session
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(now);
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now, or the duration to wait otherwise.
    pub fn time_until_next_request(&self, min_interval: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < min_interval {
            Some(min_interval - elapsed)
        } else {
            None
        }
    }

    /// Stores a freshly acquired token
    pub fn set_token(&mut self, token: String) {
        if self.token.is_some() {
            self.token_refreshes += 1;
        }
        self.token = Some(token);
    }

    /// Drops the current token so the next request re-acquires one
    pub fn invalidate_token(&mut self) {
        self.token = None;
    }
}
