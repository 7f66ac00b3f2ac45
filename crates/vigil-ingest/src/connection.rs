use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Connectivity health and reconnect backoff for the monitoring source.
///
/// Pure bookkeeping: no clocks are read internally except in the
/// `Utc::now()` convenience wrappers, and no external calls are made.
/// Writes are serialized by the orchestrator; readers take cheap
/// [`ConnectionStatus`] snapshots.
#[derive(Debug)]
pub struct ConnectionTracker {
    connected: bool,
    error_count: u64,
    consecutive_failures: u64,
    last_error: Option<String>,
    last_check: Option<DateTime<Utc>>,
    last_successful_poll: Option<DateTime<Utc>>,
    initial_backoff_secs: u64,
    max_backoff_secs: u64,
    current_backoff_secs: u64,
    next_reconnect_at: Option<DateTime<Utc>>,
}

/// Read-only snapshot of the tracker, served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub error_count: u64,
    pub consecutive_failures: u64,
    pub last_error: Option<String>,
    pub last_check: Option<DateTime<Utc>>,
    pub last_successful_poll: Option<DateTime<Utc>>,
    pub current_backoff_secs: u64,
    pub next_reconnect_at: Option<DateTime<Utc>>,
}

impl ConnectionTracker {
    /// `initial_backoff_secs` defaults to 1 and `max_backoff_secs` to 300
    /// in the server config; both are injectable for tests.
    pub fn new(initial_backoff_secs: u64, max_backoff_secs: u64) -> Self {
        Self {
            connected: false,
            error_count: 0,
            consecutive_failures: 0,
            last_error: None,
            last_check: None,
            last_successful_poll: None,
            initial_backoff_secs,
            max_backoff_secs,
            current_backoff_secs: initial_backoff_secs,
            next_reconnect_at: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn mark_connected(&mut self) {
        self.mark_connected_at(Utc::now());
    }

    /// Record a successful poll: counters and backoff reset to their
    /// initial values and any scheduled reconnect is cleared.
    pub fn mark_connected_at(&mut self, now: DateTime<Utc>) {
        self.connected = true;
        self.error_count = 0;
        self.consecutive_failures = 0;
        self.current_backoff_secs = self.initial_backoff_secs;
        self.last_check = Some(now);
        self.last_successful_poll = Some(now);
        self.next_reconnect_at = None;
        tracing::info!("Source connection established (backoff reset)");
    }

    pub fn mark_disconnected(&mut self, error: &str) {
        self.mark_disconnected_at(error, Utc::now());
    }

    /// Record a failed poll. Counts the failure and stores the error but
    /// does not advance the backoff schedule; [`Self::attempt_reconnect_at`]
    /// owns that.
    pub fn mark_disconnected_at(&mut self, error: &str, now: DateTime<Utc>) {
        self.connected = false;
        self.error_count += 1;
        self.consecutive_failures += 1;
        self.last_error = Some(error.to_string());
        self.last_check = Some(now);
        tracing::warn!(
            error_count = self.error_count,
            consecutive_failures = self.consecutive_failures,
            error,
            "Source disconnected"
        );
    }

    pub fn attempt_reconnect(&mut self) -> bool {
        self.attempt_reconnect_at(Utc::now())
    }

    /// Whether a reconnect should be tried now.
    ///
    /// The first call after a disconnect schedules an immediate attempt.
    /// Each subsequent due attempt waits `current` seconds and doubles the
    /// backoff up to the maximum. Returns `false` while still cooling
    /// down.
    pub fn attempt_reconnect_at(&mut self, now: DateTime<Utc>) -> bool {
        let Some(next_at) = self.next_reconnect_at else {
            self.next_reconnect_at = Some(now);
            tracing::debug!("Reconnect attempt scheduled immediately");
            return true;
        };

        if now >= next_at {
            let next_backoff = (self.current_backoff_secs * 2).min(self.max_backoff_secs);
            self.next_reconnect_at =
                Some(now + Duration::seconds(self.current_backoff_secs as i64));
            tracing::info!(
                attempt = self.consecutive_failures,
                wait_secs = self.current_backoff_secs,
                next_backoff_secs = next_backoff,
                "Reconnect attempt due"
            );
            self.current_backoff_secs = next_backoff;
            true
        } else {
            let wait = (next_at - now).num_seconds();
            tracing::debug!(wait_secs = wait, "Still in backoff window");
            false
        }
    }

    pub fn current_backoff_secs(&self) -> u64 {
        self.current_backoff_secs
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures
    }

    /// Snapshot of all fields for external reporting. No side effects.
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            connected: self.connected,
            error_count: self.error_count,
            consecutive_failures: self.consecutive_failures,
            last_error: self.last_error.clone(),
            last_check: self.last_check,
            last_successful_poll: self.last_successful_poll,
            current_backoff_secs: self.current_backoff_secs,
            next_reconnect_at: self.next_reconnect_at,
        }
    }
}
