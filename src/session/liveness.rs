//! Idle detection: periodic pings and a hard idle timeout.
//!
//! The monitor is started lazily on the first decoded frame. Every check
//! interval it compares `now - last_activity` against two thresholds:
//!
//! | Idle for | Action |
//! |----------|--------|
//! | `>= ping_timeout` (30s) | one Ping, until activity resumes |
//! | `>= connection_timeout` (60s) | Close sequence, monitor stops |

// ============================================================================
// Imports
// ============================================================================

use std::future;
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, info};

// ============================================================================
// Constants
// ============================================================================

/// Default period between idle checks (5s).
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(5000);

/// Default idle time before a Ping is sent (30s).
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(30);

/// Default idle time before the connection is closed (60s).
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// LivenessAction
// ============================================================================

/// Result of an idle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessAction {
    /// Connection is active enough.
    None,
    /// Send a Ping frame.
    SendPing,
    /// Idle limit reached; close the connection.
    Close,
}

// ============================================================================
// LivenessMonitor
// ============================================================================

/// Per-connection idle tracker with an owned check timer.
///
/// The timer lives inside the monitor, so it is dropped together with the
/// connection that owns it.
#[derive(Debug)]
pub struct LivenessMonitor {
    last_activity: Instant,
    ping_sent: bool,
    check_interval: Duration,
    ping_timeout: Duration,
    connection_timeout: Duration,
    ticker: Option<Interval>,
}

impl LivenessMonitor {
    /// Creates a stopped monitor.
    #[must_use]
    pub fn new(
        check_interval: Duration,
        ping_timeout: Duration,
        connection_timeout: Duration,
    ) -> Self {
        Self {
            last_activity: Instant::now(),
            ping_sent: false,
            check_interval,
            ping_timeout,
            connection_timeout,
            ticker: None,
        }
    }

    /// Records activity at `now`, starting the monitor on first use.
    pub fn record_activity(&mut self, now: Instant) {
        self.last_activity = now;
        self.ping_sent = false;

        if self.ticker.is_none() {
            let mut ticker = interval_at(now + self.check_interval, self.check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.ticker = Some(ticker);
            debug!(interval_ms = self.check_interval.as_millis() as u64, "Liveness monitor started");
        }
    }

    /// Returns `true` once the first frame has been seen.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Returns `true` if a Ping is outstanding.
    #[inline]
    #[must_use]
    pub fn ping_sent(&self) -> bool {
        self.ping_sent
    }

    /// Time of the last recorded activity.
    #[inline]
    #[must_use]
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Waits for the next check. Never completes while stopped.
    pub async fn tick(&mut self) -> Instant {
        match self.ticker.as_mut() {
            Some(ticker) => ticker.tick().await,
            None => future::pending().await,
        }
    }

    /// Evaluates idleness at `now`.
    ///
    /// Returns [`LivenessAction::SendPing`] at most once per idle period.
    /// [`LivenessAction::Close`] also stops the monitor.
    pub fn check(&mut self, now: Instant) -> LivenessAction {
        let idle = now.saturating_duration_since(self.last_activity);

        if idle >= self.connection_timeout {
            info!(idle_secs = idle.as_secs(), "Connection idle limit reached");
            self.stop();
            return LivenessAction::Close;
        }

        if idle >= self.ping_timeout && !self.ping_sent {
            debug!(idle_secs = idle.as_secs(), "Connection idle, sending ping");
            self.ping_sent = true;
            return LivenessAction::SendPing;
        }

        LivenessAction::None
    }

    /// Cancels the check timer.
    pub fn stop(&mut self) {
        self.ticker = None;
    }
}

impl Default for LivenessMonitor {
    fn default() -> Self {
        Self::new(
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_PING_TIMEOUT,
            DEFAULT_CONNECTION_TIMEOUT,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
